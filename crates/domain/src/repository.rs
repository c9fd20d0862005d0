//! Event-sourced repository: load by replay, save by conditional append.

use std::collections::HashMap;
use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Version};

use crate::aggregate::{Aggregate, AggregateRoot, DomainEvent};
use crate::error::DomainError;

/// Loads and saves [`AggregateRoot`]s of type `A` against an event store.
///
/// The store's compare-and-append is the only consistency gate: `save`
/// either appends every uncommitted event at the expected position or
/// appends nothing.
pub struct EventSourcedRepository<S, A> {
    store: S,
    _aggregate: PhantomData<fn() -> A>,
}

impl<S: Clone, A> Clone for EventSourcedRepository<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<S, A> EventSourcedRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the aggregate from its full history.
    ///
    /// Every stored event is replayed in version order; a gap or an event
    /// recorded under another aggregate type is reported instead of being
    /// skipped.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get_by_id(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<AggregateRoot<A>, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        match events.first() {
            None => return Err(DomainError::not_found(A::aggregate_type(), aggregate_id)),
            Some(first) if first.aggregate_type != A::aggregate_type() => {
                return Err(DomainError::not_found(A::aggregate_type(), aggregate_id));
            }
            Some(_) => {}
        }

        let mut root = AggregateRoot::new(aggregate_id);
        for envelope in events {
            let expected = root.current_version().next();
            if envelope.version != expected {
                return Err(DomainError::CorruptHistory {
                    aggregate_id,
                    expected,
                    found: envelope.version,
                });
            }
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            root.apply(event, false);
        }
        root.mark_committed();

        tracing::debug!(version = %root.current_version(), "aggregate loaded");
        Ok(root)
    }

    /// Returns true if at least one event exists for `aggregate_id`.
    pub async fn exists(&self, aggregate_id: AggregateId) -> Result<bool, DomainError> {
        Ok(self.store.aggregate_exists(aggregate_id).await?)
    }

    /// Appends the root's uncommitted events, expecting the stored version to
    /// be `expected_version`.
    ///
    /// On success the uncommitted list is cleared and the appended envelopes
    /// are returned in order. On conflict nothing is persisted and the root
    /// is left untouched.
    pub async fn save(
        &self,
        root: &mut AggregateRoot<A>,
        expected_version: Version,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        self.save_with_metadata(root, expected_version, &HashMap::new())
            .await
    }

    /// [`save`](Self::save), attaching `metadata` to every appended event.
    #[tracing::instrument(
        skip(self, root, metadata),
        fields(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %root.id(),
            expected = %expected_version,
            count = root.uncommitted_changes().len(),
        )
    )]
    pub async fn save_with_metadata(
        &self,
        root: &mut AggregateRoot<A>,
        expected_version: Version,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        if !root.has_uncommitted_changes() {
            return Ok(Vec::new());
        }

        let envelopes = build_envelopes(root, expected_version, metadata)?;

        match self
            .store
            .append(
                envelopes.clone(),
                AppendOptions::expect_version(expected_version),
            )
            .await
        {
            Ok(_) => {
                root.mark_committed();
                Ok(envelopes)
            }
            Err(e) if e.is_conflict() => {
                metrics::counter!("repository_concurrency_conflicts_total").increment(1);
                tracing::warn!(error = %e, "concurrency conflict, nothing persisted");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn build_envelopes<A: Aggregate>(
    root: &AggregateRoot<A>,
    expected_version: Version,
    metadata: &HashMap<String, serde_json::Value>,
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut version = expected_version;
    root.uncommitted_changes()
        .iter()
        .map(|recorded| -> Result<EventEnvelope, DomainError> {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(root.id())
                .aggregate_type(A::aggregate_type())
                .event_type(recorded.event.event_type())
                .version(version)
                .timestamp(recorded.timestamp)
                .issuer(recorded.issuer.clone())
                .payload(&recorded.event)?;
            for (key, value) in metadata {
                builder = builder.metadata(key.clone(), value.clone());
            }
            Ok(builder.build()?)
        })
        .collect()
}
