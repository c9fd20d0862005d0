//! Load heading to each destination, grouped across cargos.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::{EventEnvelope, Version};
use projections::{
    Criteria, Projection, ProjectionOutcome, QuerySpec, ReadModel, ReadStore, ReadStoreExt,
    Result, is_next,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cargo::{CargoEvent, CargoStatus};

/// What one cargo contributes to its destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CargoContribution {
    pub code: String,
    pub weight: u64,
    pub volume: u64,
    pub status: CargoStatus,
    pub deleted: bool,
    /// Last event of this cargo folded in.
    pub version: Version,
}

impl CargoContribution {
    /// Docked or in transit, and not deleted.
    pub fn is_active(&self) -> bool {
        !self.deleted && self.status != CargoStatus::Arrived
    }
}

/// Aggregated load for one destination.
///
/// The document spans several cargos, so its `version` counts folded
/// events; redelivery is detected per cargo through
/// [`CargoContribution::version`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationLoad {
    pub destination: String,
    pub active_cargo_count: usize,
    pub total_weight: u64,
    pub total_volume: u64,
    /// Codes of active cargos, sorted.
    pub cargo_codes: Vec<String>,
    /// Every cargo that ever headed here, sorted.
    pub cargo_ids: Vec<String>,
    pub cargos: BTreeMap<String, CargoContribution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl DestinationLoad {
    fn new(destination: &str, at: DateTime<Utc>) -> Self {
        Self {
            destination: destination.to_string(),
            active_cargo_count: 0,
            total_weight: 0,
            total_volume: 0,
            cargo_codes: Vec::new(),
            cargo_ids: Vec::new(),
            cargos: BTreeMap::new(),
            created_at: at,
            updated_at: at,
            version: Version::initial(),
        }
    }

    fn fold(&mut self, cargo_id: &str, event: CargoEvent, envelope: &EventEnvelope) {
        if let CargoEvent::CargoRegistered(data) = &event {
            self.cargos.insert(
                cargo_id.to_string(),
                CargoContribution {
                    code: data.code.clone(),
                    weight: 0,
                    volume: 0,
                    status: CargoStatus::Docked,
                    deleted: false,
                    version: envelope.version,
                },
            );
        } else if let Some(cargo) = self.cargos.get_mut(cargo_id) {
            match event {
                CargoEvent::ShipmentLoaded(data) => {
                    cargo.weight = cargo.weight.saturating_add(data.weight);
                    cargo.volume = cargo.volume.saturating_add(data.volume);
                }
                CargoEvent::ShipmentUnloaded(data) => {
                    cargo.weight = cargo.weight.saturating_sub(data.weight);
                    cargo.volume = cargo.volume.saturating_sub(data.volume);
                }
                CargoEvent::CargoDeparted(_) => cargo.status = CargoStatus::InTransit,
                CargoEvent::CargoArrived(_) => cargo.status = CargoStatus::Arrived,
                CargoEvent::CargoDeleted(_) => cargo.deleted = true,
                CargoEvent::CargoRegistered(_) => {}
            }
            cargo.version = envelope.version;
        }

        self.recalculate_totals();
        self.updated_at = envelope.timestamp;
        self.version = self.version.next();
    }

    fn recalculate_totals(&mut self) {
        let active: Vec<&CargoContribution> =
            self.cargos.values().filter(|c| c.is_active()).collect();

        self.active_cargo_count = active.len();
        self.total_weight = active.iter().fold(0, |sum, c| sum.saturating_add(c.weight));
        self.total_volume = active.iter().fold(0, |sum, c| sum.saturating_add(c.volume));
        self.cargo_codes = active.iter().map(|c| c.code.clone()).collect();
        self.cargo_codes.sort();
        self.cargo_ids = self.cargos.keys().cloned().collect();
    }
}

impl ReadModel for DestinationLoad {
    const MODEL_TYPE: &'static str = "DestinationLoad";

    fn id(&self) -> String {
        self.destination.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn searchable_text(&self) -> String {
        std::iter::once(self.destination.as_str())
            .chain(self.cargo_codes.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Maintains [`DestinationLoad`] documents keyed by destination name.
///
/// A document is shared by every cargo bound for its destination, so
/// each read-modify-write runs under `write`; events of different cargos
/// may otherwise be projected concurrently.
pub struct DestinationLoadProjection<R> {
    store: R,
    write: Mutex<()>,
}

impl<R: ReadStore> DestinationLoadProjection<R> {
    pub fn new(store: R) -> Self {
        Self {
            store,
            write: Mutex::new(()),
        }
    }

    async fn find_by_cargo(&self, cargo_id: &str) -> Result<Option<DestinationLoad>> {
        let spec = QuerySpec::new(Criteria::new().filter("cargoIds", cargo_id)).page(0, 1);
        let page = self.store.query_models::<DestinationLoad>(&spec).await?;
        Ok(page.items.into_iter().next())
    }
}

#[async_trait]
impl<R: ReadStore + 'static> Projection for DestinationLoadProjection<R> {
    fn name(&self) -> &'static str {
        "destination_load"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &["Cargo"]
    }

    fn can_handle(&self, event_type: &str) -> bool {
        CargoEvent::EVENT_TYPES.contains(&event_type)
    }

    async fn project(&self, envelope: &EventEnvelope) -> Result<ProjectionOutcome> {
        let cargo_id = envelope.aggregate_id.to_string();
        let event: CargoEvent = serde_json::from_value(envelope.payload.clone())?;

        let _write = self.write.lock().await;
        let load = match &event {
            CargoEvent::CargoRegistered(data) => Some(
                self.store
                    .get_model::<DestinationLoad>(&data.destination)
                    .await?
                    .unwrap_or_else(|| {
                        DestinationLoad::new(&data.destination, envelope.timestamp)
                    }),
            ),
            _ => self.find_by_cargo(&cargo_id).await?,
        };
        // No load for a later event means the registration never arrived.
        let stored = load
            .as_ref()
            .and_then(|load| load.cargos.get(&cargo_id))
            .map(|c| c.version);
        if !is_next(stored, envelope)? {
            return Ok(ProjectionOutcome::Skipped);
        }
        let Some(mut load) = load else {
            return Ok(ProjectionOutcome::Ignored);
        };

        load.fold(&cargo_id, event, envelope);
        self.store.save_model(&load).await?;
        Ok(ProjectionOutcome::Applied)
    }

    async fn reset(&self) -> Result<()> {
        let _write = self.write.lock().await;
        self.store.clear_type(DestinationLoad::MODEL_TYPE).await?;
        Ok(())
    }
}
