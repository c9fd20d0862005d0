//! Projection processor for feeding stored history to projections.

use std::sync::Arc;

use domain::{DeliveryFailure, Registry, RegistryError};
use event_store::EventStore;
use futures_util::StreamExt;

use crate::bus::deliver;
use crate::projection::{Projection, ProjectionOutcome, RebuildReport};
use crate::store::ReadStore;
use crate::{ProjectionError, Result};

/// Counts from one [`ProjectionProcessor::run_catch_up`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatchUpReport {
    pub events: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failures: Vec<DeliveryFailure>,
}

/// Replays stored events into registered projections.
///
/// The processor supports:
/// - Catch-up: streams the whole log in commit order; already-applied
///   versions are skipped by the projections themselves
/// - Rebuild: reset one or all projections and replay their history
/// - Version checks: rebuild any projection whose declared version differs
///   from the checkpoint in the read store
///
/// Registration follows `new → register* → freeze`; lookups by name fail
/// until the processor is frozen.
pub struct ProjectionProcessor<S, R> {
    store: S,
    read_store: R,
    projections: Vec<Arc<dyn Projection>>,
    by_name: Registry<usize>,
}

impl<S, R> ProjectionProcessor<S, R>
where
    S: EventStore,
    R: ReadStore,
{
    pub fn new(store: S, read_store: R) -> Self {
        Self {
            store,
            read_store,
            projections: Vec::new(),
            by_name: Registry::new("projection"),
        }
    }

    /// Registers a projection. Names must be unique.
    pub fn register(
        &mut self,
        projection: Arc<dyn Projection>,
    ) -> std::result::Result<(), RegistryError> {
        self.by_name
            .register(projection.name(), self.projections.len())?;
        self.projections.push(projection);
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.by_name.freeze();
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Registered projections in registration order.
    pub fn projections(&self) -> &[Arc<dyn Projection>] {
        &self.projections
    }

    /// Streams every stored event, in commit order, to each projection that
    /// handles it. A failing projection is recorded and delivery continues.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<CatchUpReport> {
        let mut stream = self.store.stream_all_events().await?;
        let mut report = CatchUpReport::default();

        while let Some(result) = stream.next().await {
            let event = result?;
            report.events += 1;

            for projection in self.projections.iter().filter(|p| p.handles(&event)) {
                match deliver(projection.as_ref(), &event).await {
                    Ok(ProjectionOutcome::Applied) => report.applied += 1,
                    Ok(ProjectionOutcome::Skipped) => report.skipped += 1,
                    Ok(ProjectionOutcome::Ignored) => {}
                    Err(e) => report.failures.push(DeliveryFailure {
                        subscriber: projection.name().to_string(),
                        event_type: event.event_type.clone(),
                        aggregate_id: event.aggregate_id,
                        version: event.version,
                        error: e.to_string(),
                    }),
                }
            }
        }

        tracing::info!(
            events = report.events,
            applied = report.applied,
            skipped = report.skipped,
            failures = report.failures.len(),
            "catch-up complete"
        );
        Ok(report)
    }

    /// Resets the named projection and replays its history, then records its
    /// version as the checkpoint.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self, name: &str) -> Result<RebuildReport> {
        let index = *self.by_name.get(name).map_err(|e| match e {
            RegistryError::Unknown { .. } => ProjectionError::UnknownProjection(name.to_string()),
            other => ProjectionError::Registry(other),
        })?;
        let projection = &self.projections[index];

        let report = projection.rebuild(&self.store).await?;
        self.read_store
            .set_checkpoint(projection.name(), projection.version())
            .await?;

        tracing::info!(
            version = projection.version(),
            events = report.events,
            applied = report.applied,
            "projection rebuilt"
        );
        Ok(report)
    }

    /// Rebuilds every projection in registration order.
    pub async fn rebuild_all(&self) -> Result<Vec<(&'static str, RebuildReport)>> {
        let mut reports = Vec::with_capacity(self.projections.len());
        for projection in &self.projections {
            let report = self.rebuild(projection.name()).await?;
            reports.push((projection.name(), report));
        }
        Ok(reports)
    }

    /// Rebuilds each projection whose checkpoint is missing or differs from
    /// its declared version. Returns the names rebuilt.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_current(&self) -> Result<Vec<&'static str>> {
        let mut rebuilt = Vec::new();
        for projection in &self.projections {
            let checkpoint = self.read_store.get_checkpoint(projection.name()).await?;
            if checkpoint != Some(projection.version()) {
                tracing::info!(
                    projection = projection.name(),
                    stored = ?checkpoint,
                    declared = projection.version(),
                    "projection version changed"
                );
                self.rebuild(projection.name()).await?;
                rebuilt.push(projection.name());
            }
        }
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::memory::InMemoryReadStore;
    use crate::projection::is_next;
    use crate::read_model::ReadModel;
    use crate::store::ReadStoreExt;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tally {
        id: String,
        count: u32,
        version: Version,
    }

    impl ReadModel for Tally {
        const MODEL_TYPE: &'static str = "Tally";

        fn id(&self) -> String {
            self.id.clone()
        }

        fn version(&self) -> Version {
            self.version
        }
    }

    /// Counts events per aggregate into a `Tally` read model.
    struct TallyProjection {
        store: InMemoryReadStore,
        version: AtomicU32,
    }

    impl TallyProjection {
        fn new(store: InMemoryReadStore) -> Arc<Self> {
            Arc::new(Self {
                store,
                version: AtomicU32::new(1),
            })
        }
    }

    #[async_trait]
    impl Projection for TallyProjection {
        fn name(&self) -> &'static str {
            "tally"
        }

        fn version(&self) -> u32 {
            self.version.load(Ordering::SeqCst)
        }

        fn aggregate_types(&self) -> &'static [&'static str] {
            &["Cargo"]
        }

        fn can_handle(&self, _event_type: &str) -> bool {
            true
        }

        async fn project(&self, event: &EventEnvelope) -> Result<ProjectionOutcome> {
            let id = event.aggregate_id.to_string();
            let current: Option<Tally> = self.store.get_model(&id).await?;
            if !is_next(current.as_ref().map(|t| t.version), event)? {
                return Ok(ProjectionOutcome::Skipped);
            }
            let count = current.map_or(0, |t| t.count) + 1;
            self.store
                .save_model(&Tally {
                    id,
                    count,
                    version: event.version,
                })
                .await?;
            Ok(ProjectionOutcome::Applied)
        }

        async fn reset(&self) -> Result<()> {
            self.store.clear_type(Tally::MODEL_TYPE).await?;
            Ok(())
        }
    }

    fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(aggregate_type)
            .event_type("Something")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    async fn seeded_store(cargo: AggregateId) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        store
            .append(
                (1..=3).map(|v| event(cargo, "Cargo", v)).collect(),
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .append(vec![event(AggregateId::new(), "User", 1)], AppendOptions::expect_new())
            .await
            .unwrap();
        store
    }

    fn processor(
        store: InMemoryEventStore,
        reads: InMemoryReadStore,
        projection: Arc<TallyProjection>,
    ) -> ProjectionProcessor<InMemoryEventStore, InMemoryReadStore> {
        let mut processor = ProjectionProcessor::new(store, reads);
        processor.register(projection).unwrap();
        processor.freeze();
        processor
    }

    #[tokio::test]
    async fn catch_up_is_idempotent() {
        let cargo = AggregateId::new();
        let reads = InMemoryReadStore::new();
        let processor = processor(
            seeded_store(cargo).await,
            reads.clone(),
            TallyProjection::new(reads.clone()),
        );

        let first = processor.run_catch_up().await.unwrap();
        assert_eq!(first.events, 4);
        assert_eq!(first.applied, 3);

        let second = processor.run_catch_up().await.unwrap();
        assert_eq!(second.applied, 0);
        assert_eq!(second.skipped, 3);

        let tally: Tally = reads.get_model(&cargo.to_string()).await.unwrap().unwrap();
        assert_eq!(tally.count, 3);
        assert_eq!(tally.version, Version::new(3));
    }

    #[tokio::test]
    async fn catch_up_fills_a_version_gap() {
        let cargo = AggregateId::new();
        let reads = InMemoryReadStore::new();
        let projection = TallyProjection::new(reads.clone());
        let processor = processor(seeded_store(cargo).await, reads.clone(), projection.clone());

        projection.project(&event(cargo, "Cargo", 1)).await.unwrap();
        assert!(matches!(
            projection.project(&event(cargo, "Cargo", 3)).await,
            Err(ProjectionError::VersionGap { .. })
        ));

        let report = processor.run_catch_up().await.unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);

        let tally: Tally = reads.get_model(&cargo.to_string()).await.unwrap().unwrap();
        assert_eq!(tally.count, 3);
        assert_eq!(tally.version, Version::new(3));
    }

    #[tokio::test]
    async fn rebuild_matches_incremental_state() {
        let cargo = AggregateId::new();
        let reads = InMemoryReadStore::new();
        let processor = processor(
            seeded_store(cargo).await,
            reads.clone(),
            TallyProjection::new(reads.clone()),
        );

        processor.run_catch_up().await.unwrap();
        let incremental: Tally = reads.get_model(&cargo.to_string()).await.unwrap().unwrap();

        let report = processor.rebuild("tally").await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(report.applied, 3);

        let rebuilt: Tally = reads.get_model(&cargo.to_string()).await.unwrap().unwrap();
        assert_eq!(rebuilt, incremental);
        assert_eq!(reads.get_checkpoint("tally").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn rebuild_unknown_projection() {
        let reads = InMemoryReadStore::new();
        let processor = processor(
            InMemoryEventStore::new(),
            reads.clone(),
            TallyProjection::new(reads),
        );
        assert!(matches!(
            processor.rebuild("nope").await,
            Err(ProjectionError::UnknownProjection(_))
        ));
    }

    #[tokio::test]
    async fn ensure_current_rebuilds_on_version_change() {
        let cargo = AggregateId::new();
        let reads = InMemoryReadStore::new();
        let projection = TallyProjection::new(reads.clone());
        let processor = processor(seeded_store(cargo).await, reads.clone(), projection.clone());

        assert_eq!(processor.ensure_current().await.unwrap(), vec!["tally"]);
        assert!(processor.ensure_current().await.unwrap().is_empty());

        projection.version.store(2, Ordering::SeqCst);
        assert_eq!(processor.ensure_current().await.unwrap(), vec!["tally"]);
        assert_eq!(reads.get_checkpoint("tally").await.unwrap(), Some(2));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let reads = InMemoryReadStore::new();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new(), reads.clone());
        processor
            .register(TallyProjection::new(reads.clone()))
            .unwrap();
        assert!(matches!(
            processor.register(TallyProjection::new(reads)),
            Err(RegistryError::Duplicate { .. })
        ));
        assert_eq!(processor.projection_count(), 1);
    }
}
