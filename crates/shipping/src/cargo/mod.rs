//! Cargo aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod status;

pub use aggregate::{Cargo, Shipment};
pub use commands::CargoCommand;
pub use events::{
    CargoArrivedData, CargoDeletedData, CargoDepartedData, CargoEvent, CargoRegisteredData,
    ShipmentLoadedData, ShipmentUnloadedData,
};
pub use status::CargoStatus;

use thiserror::Error;

/// Business rule violations on a cargo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CargoError {
    #[error("cargo already registered")]
    AlreadyRegistered,

    #[error("cargo is not registered")]
    NotRegistered,

    #[error("cannot {action} while cargo is {status}")]
    InvalidStatus {
        status: CargoStatus,
        action: &'static str,
    },

    #[error("would exceed weight capacity ({total} of {max})")]
    WeightCapacityExceeded { total: u64, max: u64 },

    #[error("would exceed volume capacity ({total} of {max})")]
    VolumeCapacityExceeded { total: u64, max: u64 },

    #[error("shipment {0} is already loaded")]
    DuplicateShipment(String),

    #[error("shipment {0} is not on this cargo")]
    UnknownShipment(String),

    #[error("cargo has no shipments")]
    Empty,
}
