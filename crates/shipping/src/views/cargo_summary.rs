//! One summary document per cargo.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::{EventEnvelope, Version};
use projections::{
    Projection, ProjectionOutcome, ReadModel, ReadStore, ReadStoreExt, Result, is_next,
};
use serde::{Deserialize, Serialize};

use crate::cargo::{CargoEvent, CargoRegisteredData, CargoStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CargoSummary {
    pub cargo_id: String,
    pub code: String,
    pub origin: String,
    pub destination: String,
    pub status: CargoStatus,
    pub max_weight: u64,
    pub max_volume: u64,
    pub total_weight: u64,
    pub total_volume: u64,
    /// Sorted.
    pub shipment_ids: Vec<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub departed_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl CargoSummary {
    fn registered(cargo_id: String, data: CargoRegisteredData, version: Version) -> Self {
        Self {
            cargo_id,
            code: data.code,
            origin: data.origin,
            destination: data.destination,
            status: CargoStatus::Docked,
            max_weight: data.max_weight,
            max_volume: data.max_volume,
            total_weight: 0,
            total_volume: 0,
            shipment_ids: Vec::new(),
            deleted: false,
            created_at: data.registered_at,
            departed_at: None,
            arrived_at: None,
            version,
        }
    }

    fn fold(&mut self, event: CargoEvent) {
        match event {
            CargoEvent::CargoRegistered(_) => {}
            CargoEvent::ShipmentLoaded(data) => {
                if let Err(at) = self.shipment_ids.binary_search(&data.shipment_id) {
                    self.shipment_ids.insert(at, data.shipment_id);
                    self.total_weight = self.total_weight.saturating_add(data.weight);
                    self.total_volume = self.total_volume.saturating_add(data.volume);
                }
            }
            CargoEvent::ShipmentUnloaded(data) => {
                if let Ok(at) = self.shipment_ids.binary_search(&data.shipment_id) {
                    self.shipment_ids.remove(at);
                    self.total_weight = self.total_weight.saturating_sub(data.weight);
                    self.total_volume = self.total_volume.saturating_sub(data.volume);
                }
            }
            CargoEvent::CargoDeparted(data) => {
                self.status = CargoStatus::InTransit;
                self.departed_at = Some(data.departed_at);
            }
            CargoEvent::CargoArrived(data) => {
                self.status = CargoStatus::Arrived;
                self.arrived_at = Some(data.arrived_at);
            }
            CargoEvent::CargoDeleted(_) => self.deleted = true,
        }
    }
}

impl ReadModel for CargoSummary {
    const MODEL_TYPE: &'static str = "CargoSummary";

    fn id(&self) -> String {
        self.cargo_id.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn searchable_text(&self) -> String {
        let mut text = format!("{} {} {}", self.code, self.origin, self.destination);
        for shipment in &self.shipment_ids {
            text.push(' ');
            text.push_str(shipment);
        }
        text
    }
}

/// Maintains [`CargoSummary`] documents. Deleted cargo keeps its document
/// with `deleted` set.
pub struct CargoSummaryProjection<R> {
    store: R,
}

impl<R: ReadStore> CargoSummaryProjection<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<R: ReadStore + 'static> Projection for CargoSummaryProjection<R> {
    fn name(&self) -> &'static str {
        "cargo_summary"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &["Cargo"]
    }

    fn can_handle(&self, event_type: &str) -> bool {
        CargoEvent::EVENT_TYPES.contains(&event_type)
    }

    async fn project(&self, envelope: &EventEnvelope) -> Result<ProjectionOutcome> {
        let id = envelope.aggregate_id.to_string();
        let current: Option<CargoSummary> = self.store.get_model(&id).await?;
        if !is_next(current.as_ref().map(|s| s.version), envelope)? {
            return Ok(ProjectionOutcome::Skipped);
        }

        let event: CargoEvent = serde_json::from_value(envelope.payload.clone())?;
        let summary = match (event, current) {
            (CargoEvent::CargoRegistered(data), _) => {
                CargoSummary::registered(id, data, envelope.version)
            }
            (event, Some(mut summary)) => {
                summary.fold(event);
                summary.version = envelope.version;
                summary
            }
            (_, None) => {
                tracing::warn!(
                    cargo_id = %id,
                    version = %envelope.version,
                    event_type = %envelope.event_type,
                    "event for unregistered cargo"
                );
                return Ok(ProjectionOutcome::Ignored);
            }
        };

        self.store.save_model(&summary).await?;
        Ok(ProjectionOutcome::Applied)
    }

    async fn reset(&self) -> Result<()> {
        self.store.clear_type(CargoSummary::MODEL_TYPE).await?;
        Ok(())
    }
}
