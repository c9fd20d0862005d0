//! Shipping domain: the Cargo aggregate and its read models.

pub mod cargo;
pub mod views;

pub use cargo::{Cargo, CargoCommand, CargoError, CargoEvent, CargoStatus, Shipment};
pub use views::{
    CargoContribution, CargoSummary, CargoSummaryProjection, DestinationLoad,
    DestinationLoadProjection,
};
