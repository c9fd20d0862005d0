//! Cargo aggregate implementation.

use std::collections::BTreeMap;

use chrono::Utc;
use domain::Aggregate;
use serde::{Deserialize, Serialize};

use super::{CargoError, CargoEvent, CargoRegisteredData, CargoStatus, ShipmentUnloadedData};

/// A shipment on board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub weight: u64,
    pub volume: u64,
}

/// A cargo carrier travelling from an origin to one destination.
///
/// Weight and volume are bounded by the capacities given at
/// registration; shipments change only while docked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cargo {
    registered: bool,
    code: String,
    origin: String,
    destination: String,
    max_weight: u64,
    max_volume: u64,
    status: CargoStatus,
    shipments: BTreeMap<String, Shipment>,
    total_weight: u64,
    total_volume: u64,
}

impl Aggregate for Cargo {
    type Event = CargoEvent;
    type Error = CargoError;

    fn aggregate_type() -> &'static str {
        "Cargo"
    }

    fn apply(&mut self, event: &CargoEvent) {
        match event {
            CargoEvent::CargoRegistered(data) => {
                self.registered = true;
                self.code = data.code.clone();
                self.origin = data.origin.clone();
                self.destination = data.destination.clone();
                self.max_weight = data.max_weight;
                self.max_volume = data.max_volume;
            }
            CargoEvent::ShipmentLoaded(data) => {
                self.shipments.insert(
                    data.shipment_id.clone(),
                    Shipment {
                        weight: data.weight,
                        volume: data.volume,
                    },
                );
                self.total_weight = self.total_weight.saturating_add(data.weight);
                self.total_volume = self.total_volume.saturating_add(data.volume);
            }
            CargoEvent::ShipmentUnloaded(data) => {
                if self.shipments.remove(&data.shipment_id).is_some() {
                    self.total_weight = self.total_weight.saturating_sub(data.weight);
                    self.total_volume = self.total_volume.saturating_sub(data.volume);
                }
            }
            CargoEvent::CargoDeparted(_) => self.status = CargoStatus::InTransit,
            CargoEvent::CargoArrived(_) => self.status = CargoStatus::Arrived,
            CargoEvent::CargoDeleted(_) => {}
        }
    }

    fn validate(&self) -> Result<(), CargoError> {
        if !self.registered {
            return Err(CargoError::NotRegistered);
        }
        if self.total_weight > self.max_weight {
            return Err(CargoError::WeightCapacityExceeded {
                total: self.total_weight,
                max: self.max_weight,
            });
        }
        if self.total_volume > self.max_volume {
            return Err(CargoError::VolumeCapacityExceeded {
                total: self.total_volume,
                max: self.max_volume,
            });
        }
        Ok(())
    }

    fn is_deletion(event: &CargoEvent) -> bool {
        matches!(event, CargoEvent::CargoDeleted(_))
    }

    fn deletion_event(&self) -> Option<CargoEvent> {
        Some(CargoEvent::deleted())
    }
}

// Query methods
impl Cargo {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn status(&self) -> CargoStatus {
        self.status
    }

    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    pub fn max_volume(&self) -> u64 {
        self.max_volume
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn shipment(&self, shipment_id: &str) -> Option<&Shipment> {
        self.shipments.get(shipment_id)
    }

    pub fn shipment_count(&self) -> usize {
        self.shipments.len()
    }
}

// Command methods (return events)
impl Cargo {
    pub fn register(
        &self,
        code: &str,
        origin: &str,
        destination: &str,
        max_weight: u64,
        max_volume: u64,
    ) -> Result<Vec<CargoEvent>, CargoError> {
        if self.registered {
            return Err(CargoError::AlreadyRegistered);
        }

        Ok(vec![CargoEvent::CargoRegistered(CargoRegisteredData {
            code: code.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            max_weight,
            max_volume,
            registered_at: Utc::now(),
        })])
    }

    pub fn load_shipment(
        &self,
        shipment_id: &str,
        weight: u64,
        volume: u64,
    ) -> Result<Vec<CargoEvent>, CargoError> {
        self.ensure_status("load a shipment", CargoStatus::can_modify_shipments)?;

        if self.shipments.contains_key(shipment_id) {
            return Err(CargoError::DuplicateShipment(shipment_id.to_string()));
        }

        // An overflowing sum is over any capacity; it is reported as u64::MAX.
        match self.total_weight.checked_add(weight) {
            Some(total) if total <= self.max_weight => {}
            total => {
                return Err(CargoError::WeightCapacityExceeded {
                    total: total.unwrap_or(u64::MAX),
                    max: self.max_weight,
                });
            }
        }
        match self.total_volume.checked_add(volume) {
            Some(total) if total <= self.max_volume => {}
            total => {
                return Err(CargoError::VolumeCapacityExceeded {
                    total: total.unwrap_or(u64::MAX),
                    max: self.max_volume,
                });
            }
        }

        Ok(vec![CargoEvent::shipment_loaded(shipment_id, weight, volume)])
    }

    pub fn unload_shipment(&self, shipment_id: &str) -> Result<Vec<CargoEvent>, CargoError> {
        self.ensure_status("unload a shipment", CargoStatus::can_modify_shipments)?;

        let shipment = self
            .shipments
            .get(shipment_id)
            .ok_or_else(|| CargoError::UnknownShipment(shipment_id.to_string()))?;

        Ok(vec![CargoEvent::ShipmentUnloaded(ShipmentUnloadedData {
            shipment_id: shipment_id.to_string(),
            weight: shipment.weight,
            volume: shipment.volume,
        })])
    }

    pub fn depart(&self) -> Result<Vec<CargoEvent>, CargoError> {
        self.ensure_status("depart", CargoStatus::can_depart)?;
        if self.shipments.is_empty() {
            return Err(CargoError::Empty);
        }
        Ok(vec![CargoEvent::departed()])
    }

    pub fn arrive(&self) -> Result<Vec<CargoEvent>, CargoError> {
        self.ensure_status("arrive", CargoStatus::can_arrive)?;
        Ok(vec![CargoEvent::arrived()])
    }

    /// Cargo at sea cannot be deleted.
    pub fn ensure_deletable(&self) -> Result<(), CargoError> {
        self.ensure_status("delete", |s| !matches!(s, CargoStatus::InTransit))
    }

    fn ensure_status(
        &self,
        action: &'static str,
        allowed: impl Fn(&CargoStatus) -> bool,
    ) -> Result<(), CargoError> {
        if !self.registered {
            return Err(CargoError::NotRegistered);
        }
        if !allowed(&self.status) {
            return Err(CargoError::InvalidStatus {
                status: self.status,
                action,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use domain::{AggregateError, AggregateRoot, DomainError};
    use event_store::Version;

    use super::*;

    fn registered(max_weight: u64, max_volume: u64) -> AggregateRoot<Cargo> {
        let mut root: AggregateRoot<Cargo> = AggregateRoot::new(AggregateId::new());
        root.execute(|c| c.register("CG-1", "Rotterdam", "Lagos", max_weight, max_volume))
            .unwrap();
        root
    }

    #[test]
    fn registration_sets_capacities() {
        let root = registered(1000, 50);
        assert_eq!(root.current_version(), Version::first());
        assert_eq!(root.state().max_weight(), 1000);
        assert_eq!(root.state().destination(), "Lagos");
        assert_eq!(root.state().status(), CargoStatus::Docked);
    }

    #[test]
    fn loading_over_weight_capacity_is_rejected() {
        let mut root = registered(1000, 100);
        root.execute(|c| c.load_shipment("SHP-1", 800, 10)).unwrap();
        let before = root.current_version();

        let err = root
            .execute(|c| c.load_shipment("SHP-2", 300, 10))
            .unwrap_err();
        assert!(err.to_string().contains("would exceed weight capacity"));
        assert_eq!(root.current_version(), before);
        assert_eq!(root.uncommitted_changes().len(), 2);
        assert_eq!(root.state().total_weight(), 800);

        let err: DomainError = err.into();
        assert_eq!(err.kind(), domain::ErrorKind::Validation);
    }

    #[test]
    fn loading_over_volume_capacity_is_rejected() {
        let mut root = registered(1000, 5);
        let err = root
            .execute(|c| c.load_shipment("SHP-1", 1, 6))
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Rule(CargoError::VolumeCapacityExceeded { total: 6, max: 5 })
        ));
    }

    #[test]
    fn overflowing_load_is_rejected_not_wrapped() {
        let mut root = registered(1000, 100);
        root.execute(|c| c.load_shipment("SHP-1", 800, 10)).unwrap();
        let before = root.current_version();

        let err = root
            .execute(|c| c.load_shipment("SHP-2", u64::MAX, 1))
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Rule(CargoError::WeightCapacityExceeded {
                total: u64::MAX,
                max: 1000
            })
        ));

        let err = root
            .execute(|c| c.load_shipment("SHP-3", 1, u64::MAX))
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::Rule(CargoError::VolumeCapacityExceeded { .. })
        ));

        assert_eq!(root.current_version(), before);
        assert_eq!(root.state().total_weight(), 800);
    }

    #[test]
    fn unloading_frees_capacity() {
        let mut root = registered(1000, 100);
        root.execute(|c| c.load_shipment("SHP-1", 800, 10)).unwrap();
        root.execute(|c| c.unload_shipment("SHP-1")).unwrap();
        root.execute(|c| c.load_shipment("SHP-2", 900, 10)).unwrap();

        assert_eq!(root.state().total_weight(), 900);
        assert_eq!(root.state().shipment_count(), 1);
        assert!(root.validate().is_ok());
    }

    #[test]
    fn duplicate_and_unknown_shipments() {
        let mut root = registered(1000, 100);
        root.execute(|c| c.load_shipment("SHP-1", 1, 1)).unwrap();

        assert!(matches!(
            root.execute(|c| c.load_shipment("SHP-1", 1, 1)),
            Err(AggregateError::Rule(CargoError::DuplicateShipment(_)))
        ));
        assert!(matches!(
            root.execute(|c| c.unload_shipment("SHP-9")),
            Err(AggregateError::Rule(CargoError::UnknownShipment(_)))
        ));
    }

    #[test]
    fn voyage_lifecycle() {
        let mut root = registered(1000, 100);
        assert!(matches!(
            root.execute(|c| c.depart()),
            Err(AggregateError::Rule(CargoError::Empty))
        ));

        root.execute(|c| c.load_shipment("SHP-1", 10, 1)).unwrap();
        root.execute(|c| c.depart()).unwrap();
        assert_eq!(root.state().status(), CargoStatus::InTransit);

        let err = root
            .execute(|c| c.load_shipment("SHP-2", 10, 1))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot load a shipment while cargo is InTransit"
        );
        assert!(root.state().ensure_deletable().is_err());

        root.execute(|c| c.arrive()).unwrap();
        assert_eq!(root.state().status(), CargoStatus::Arrived);
        assert!(root.state().ensure_deletable().is_ok());
        assert_eq!(root.current_version(), Version::new(4));
    }

    #[test]
    fn deleted_cargo_rejects_everything() {
        let mut root = registered(1000, 100);
        root.mark_as_deleted().unwrap();

        assert!(root.is_deleted());
        assert!(matches!(
            root.execute(|c| c.load_shipment("SHP-1", 1, 1)),
            Err(AggregateError::Deleted { .. })
        ));
        assert!(root.mark_as_deleted().is_err());
    }

    #[test]
    fn replay_matches_live_state() {
        let mut live = registered(1000, 100);
        live.execute(|c| c.load_shipment("SHP-1", 300, 3)).unwrap();
        live.execute(|c| c.load_shipment("SHP-2", 200, 2)).unwrap();
        live.execute(|c| c.unload_shipment("SHP-1")).unwrap();

        let mut replayed = AggregateRoot::<Cargo>::new(live.id());
        for recorded in live.uncommitted_changes() {
            replayed.apply(recorded.event.clone(), false);
        }

        assert_eq!(replayed.state(), live.state());
        assert_eq!(replayed.current_version(), live.current_version());
        assert!(!replayed.has_uncommitted_changes());
    }
}
