//! The seam between the write side and event subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::Serialize;

/// One subscriber failing to handle one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryFailure {
    pub subscriber: String,
    pub event_type: String,
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub error: String,
}

/// Outcome of handing a batch of committed events to the bus.
///
/// Failures are isolated per subscriber and never undo the commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishReport {
    /// Events handed to the bus.
    pub events: usize,
    /// Successful (or enqueued) subscriber deliveries.
    pub deliveries: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: PublishReport) {
        self.events += other.events;
        self.deliveries += other.deliveries;
        self.failures.extend(other.failures);
    }
}

/// Delivers committed events to subscribers.
///
/// Implementations must deliver the events of one aggregate to each
/// subscriber in the order given, and must keep one subscriber's failure
/// from affecting the others.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, events: &[EventEnvelope]) -> PublishReport;
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, events: &[EventEnvelope]) -> PublishReport {
        (**self).publish(events).await
    }
}

/// A bus with no subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, events: &[EventEnvelope]) -> PublishReport {
        PublishReport {
            events: events.len(),
            ..Default::default()
        }
    }
}
