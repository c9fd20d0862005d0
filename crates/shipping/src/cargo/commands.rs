//! Cargo commands.

use domain::{AggregateError, AggregateRoot, Command, DomainError};
use serde::{Deserialize, Serialize};

use super::{Cargo, CargoError};

/// Commands accepted by the Cargo aggregate.
///
/// On the wire a command is `{"type": "LoadShipment", "data": {...}}` with
/// camelCase fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum CargoCommand {
    Register {
        code: String,
        origin: String,
        destination: String,
        max_weight: u64,
        max_volume: u64,
    },
    LoadShipment {
        shipment_id: String,
        weight: u64,
        volume: u64,
    },
    UnloadShipment {
        shipment_id: String,
    },
    Depart {},
    Arrive {},
    Delete {},
}

impl Command for CargoCommand {
    type Aggregate = Cargo;

    const COMMAND_TYPES: &'static [&'static str] = &[
        "Register",
        "LoadShipment",
        "UnloadShipment",
        "Depart",
        "Arrive",
        "Delete",
    ];

    fn command_type(&self) -> &'static str {
        match self {
            CargoCommand::Register { .. } => "Register",
            CargoCommand::LoadShipment { .. } => "LoadShipment",
            CargoCommand::UnloadShipment { .. } => "UnloadShipment",
            CargoCommand::Depart {} => "Depart",
            CargoCommand::Arrive {} => "Arrive",
            CargoCommand::Delete {} => "Delete",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, CargoCommand::Register { .. })
    }

    fn validate(&self) -> Result<(), DomainError> {
        match self {
            CargoCommand::Register {
                code,
                origin,
                destination,
                max_weight,
                max_volume,
            } => {
                require("code", code)?;
                require("origin", origin)?;
                require("destination", destination)?;
                if *max_weight == 0 || *max_volume == 0 {
                    return Err(DomainError::validation("capacities must be positive"));
                }
                Ok(())
            }
            CargoCommand::LoadShipment {
                shipment_id,
                weight,
                ..
            } => {
                require("shipmentId", shipment_id)?;
                if *weight == 0 {
                    return Err(DomainError::validation("shipment weight must be positive"));
                }
                Ok(())
            }
            CargoCommand::UnloadShipment { shipment_id } => require("shipmentId", shipment_id),
            CargoCommand::Depart {} | CargoCommand::Arrive {} | CargoCommand::Delete {} => Ok(()),
        }
    }

    fn execute(&self, root: &mut AggregateRoot<Cargo>) -> Result<(), AggregateError<CargoError>> {
        match self {
            CargoCommand::Register {
                code,
                origin,
                destination,
                max_weight,
                max_volume,
            } => root
                .execute(|c| c.register(code, origin, destination, *max_weight, *max_volume))
                .map(drop),
            CargoCommand::LoadShipment {
                shipment_id,
                weight,
                volume,
            } => root
                .execute(|c| c.load_shipment(shipment_id, *weight, *volume))
                .map(drop),
            CargoCommand::UnloadShipment { shipment_id } => root
                .execute(|c| c.unload_shipment(shipment_id))
                .map(drop),
            CargoCommand::Depart {} => root.execute(Cargo::depart).map(drop),
            CargoCommand::Arrive {} => root.execute(Cargo::arrive).map(drop),
            CargoCommand::Delete {} => {
                if !root.is_deleted() {
                    root.state()
                        .ensure_deletable()
                        .map_err(AggregateError::Rule)?;
                }
                root.mark_as_deleted()
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(())
}
