use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, Result, Version,
    store::{
        AppendOptions, EventStore, EventStream, check_append_position, validate_events_for_append,
    },
};

#[derive(Default)]
struct Log {
    /// Every event in commit order; `events[i].sequence == i + 1`.
    events: Vec<EventEnvelope>,
    /// Latest version per aggregate.
    heads: HashMap<AggregateId, Version>,
    /// Positions into `events` per aggregate, ascending.
    index: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory event store.
///
/// The whole log sits behind one `RwLock`, so the version check and the
/// append in [`EventStore::append`] happen under the same write guard and
/// form a single compare-and-append.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Clears all events.
    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.heads.clear();
        log.index.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id;
        let first_new = events[0].version;

        let mut log = self.log.write().await;
        let current = log
            .heads
            .get(&aggregate_id)
            .copied()
            .unwrap_or(Version::initial());

        if let Err(err) = check_append_position(aggregate_id, current, first_new, &options) {
            if err.is_conflict() {
                metrics::counter!("event_store_conflicts_total").increment(1);
                tracing::debug!(%aggregate_id, %current, %first_new, "append rejected");
            }
            return Err(err);
        }

        let mut last_version = current;
        for mut event in events {
            let position = log.events.len();
            event.sequence = position as i64 + 1;
            last_version = event.version;
            log.index.entry(aggregate_id).or_default().push(position);
            log.events.push(event);
        }
        log.heads.insert(aggregate_id, last_version);

        metrics::counter!("event_store_appends_total").increment(1);
        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::first())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let events = log
            .index
            .get(&aggregate_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&p| &log.events[p])
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn get_events_by_aggregate_type(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .events
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type)
            .cloned()
            .collect())
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let matching = log.events.iter().filter(|e| query.matches(e)).cloned();
        let events = match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        };
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.log.read().await.heads.get(&aggregate_id).copied())
    }
}
