use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected current version of the aggregate. When set, the append is a
    /// compare-and-append: it fails with `ConcurrencyConflict` and persists
    /// nothing unless the stored version equals this value.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the aggregate to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the aggregate to not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// A stream of committed events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Persistence contract for the append-only event log.
///
/// Implementations must make `append` atomic: a batch is either persisted
/// entirely, with contiguous versions, or not at all.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for one aggregate.
    ///
    /// Returns the version of the aggregate after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Retrieves every event of an aggregate in ascending version order.
    async fn get_events_for_aggregate(&self, aggregate_id: AggregateId)
    -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of an aggregate from `from_version` (inclusive).
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves every event of the given aggregate type in commit order.
    async fn get_events_by_aggregate_type(&self, aggregate_type: &str)
    -> Result<Vec<EventEnvelope>>;

    /// Retrieves events matching a query, in commit order.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Streams every event in the store in commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Returns the latest stored version of an aggregate, or `None` if it has
    /// no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to the store.
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    /// Returns true if the aggregate has at least one event.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for std::sync::Arc<T> {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        (**self).append(events, options).await
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).get_events_for_aggregate(aggregate_id).await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        (**self)
            .get_events_for_aggregate_from_version(aggregate_id, from_version)
            .await
    }

    async fn get_events_by_aggregate_type(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).get_events_by_aggregate_type(aggregate_type).await
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        (**self).query_events(query).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        (**self).stream_all_events().await
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        (**self).get_aggregate_version(aggregate_id).await
    }
}

/// Checks the shape of a batch before it reaches the store.
///
/// A batch must be non-empty, target a single aggregate of a single type,
/// and carry strictly contiguous versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must be for the same aggregate".to_string(),
            ));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate type".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be contiguous: expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}

/// Compares the stored version against the batch about to be appended.
///
/// Shared by every adapter so that all of them reject the same batches.
pub(crate) fn check_append_position(
    aggregate_id: AggregateId,
    current: Version,
    first_new: Version,
    options: &AppendOptions,
) -> Result<()> {
    if let Some(expected) = options.expected_version
        && current != expected
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual: current,
        });
    }

    if first_new <= current {
        // Another writer already holds this version.
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: options.expected_version.unwrap_or(current),
            actual: current,
        });
    }

    if first_new != current.next() {
        return Err(EventStoreError::InvalidAppend(format!(
            "version gap for aggregate {aggregate_id}: stored {current}, batch starts at {first_new}"
        )));
    }

    Ok(())
}
