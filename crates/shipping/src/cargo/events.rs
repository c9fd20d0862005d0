//! Cargo domain events.

use chrono::{DateTime, Utc};
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events recorded on a cargo aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CargoEvent {
    CargoRegistered(CargoRegisteredData),
    ShipmentLoaded(ShipmentLoadedData),
    ShipmentUnloaded(ShipmentUnloadedData),
    CargoDeparted(CargoDepartedData),
    CargoArrived(CargoArrivedData),
    CargoDeleted(CargoDeletedData),
}

impl CargoEvent {
    /// Every tag this enum produces.
    pub const EVENT_TYPES: &'static [&'static str] = &[
        "CargoRegistered",
        "ShipmentLoaded",
        "ShipmentUnloaded",
        "CargoDeparted",
        "CargoArrived",
        "CargoDeleted",
    ];
}

impl DomainEvent for CargoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CargoEvent::CargoRegistered(_) => "CargoRegistered",
            CargoEvent::ShipmentLoaded(_) => "ShipmentLoaded",
            CargoEvent::ShipmentUnloaded(_) => "ShipmentUnloaded",
            CargoEvent::CargoDeparted(_) => "CargoDeparted",
            CargoEvent::CargoArrived(_) => "CargoArrived",
            CargoEvent::CargoDeleted(_) => "CargoDeleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoRegisteredData {
    /// Human-facing cargo code, e.g. `CG-1042`.
    pub code: String,
    pub origin: String,
    pub destination: String,
    /// Kilograms.
    pub max_weight: u64,
    /// Cubic decimetres.
    pub max_volume: u64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentLoadedData {
    pub shipment_id: String,
    pub weight: u64,
    pub volume: u64,
}

/// Carries the unloaded amounts so folds need no lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentUnloadedData {
    pub shipment_id: String,
    pub weight: u64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoDepartedData {
    pub departed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoArrivedData {
    pub arrived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoDeletedData {
    pub deleted_at: DateTime<Utc>,
}

impl CargoEvent {
    pub fn shipment_loaded(shipment_id: impl Into<String>, weight: u64, volume: u64) -> Self {
        CargoEvent::ShipmentLoaded(ShipmentLoadedData {
            shipment_id: shipment_id.into(),
            weight,
            volume,
        })
    }

    pub fn departed() -> Self {
        CargoEvent::CargoDeparted(CargoDepartedData {
            departed_at: Utc::now(),
        })
    }

    pub fn arrived() -> Self {
        CargoEvent::CargoArrived(CargoArrivedData {
            arrived_at: Utc::now(),
        })
    }

    pub fn deleted() -> Self {
        CargoEvent::CargoDeleted(CargoDeletedData {
            deleted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_event_type() {
        let events = [
            CargoEvent::shipment_loaded("SHP-1", 10, 2),
            CargoEvent::departed(),
            CargoEvent::arrived(),
            CargoEvent::deleted(),
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
            assert!(CargoEvent::EVENT_TYPES.contains(&event.event_type()));
        }
    }

    #[test]
    fn payload_shape() {
        let json = serde_json::to_value(CargoEvent::shipment_loaded("SHP-7", 300, 4)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "ShipmentLoaded",
                "data": { "shipment_id": "SHP-7", "weight": 300, "volume": 4 }
            })
        );
    }
}
