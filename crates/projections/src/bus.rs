//! Event buses that feed committed events to projections.
//!
//! [`InProcessEventBus`] delivers inline during `publish`.
//! [`ChannelEventBus`] gives each projection its own queue and worker task;
//! `publish` returns once events are enqueued and [`ChannelEventBus::flush`]
//! waits for them to be applied.
//!
//! Both deliver a batch to each projection in the given order, so the
//! per-aggregate order established by the command handler is kept. A
//! failing projection is logged and counted and never stops delivery to the
//! others; it can be repaired with a rebuild.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{DeliveryFailure, EventBus, PublishReport};
use event_store::EventEnvelope;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::Result;
use crate::projection::{Projection, ProjectionOutcome};

/// Hands one event to one projection, recording the outcome.
pub(crate) async fn deliver(
    projection: &dyn Projection,
    event: &EventEnvelope,
) -> Result<ProjectionOutcome> {
    let outcome = projection.project(event).await;
    match &outcome {
        Ok(ProjectionOutcome::Applied) => {
            metrics::counter!("projection_events_applied_total").increment(1);
        }
        Ok(ProjectionOutcome::Skipped) => {
            metrics::counter!("projection_events_skipped_total").increment(1);
            tracing::debug!(
                projection = projection.name(),
                aggregate_id = %event.aggregate_id,
                version = %event.version,
                "event already applied"
            );
        }
        Ok(ProjectionOutcome::Ignored) => {}
        Err(e) => {
            metrics::counter!("projection_failures_total", "projection" => projection.name())
                .increment(1);
            tracing::error!(
                projection = projection.name(),
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                version = %event.version,
                error = %e,
                "projection failed"
            );
        }
    }
    outcome
}

fn failure(projection: &str, event: &EventEnvelope, error: impl ToString) -> DeliveryFailure {
    DeliveryFailure {
        subscriber: projection.to_string(),
        event_type: event.event_type.clone(),
        aggregate_id: event.aggregate_id,
        version: event.version,
        error: error.to_string(),
    }
}

/// Synchronous delivery to each subscribed projection in subscription order.
#[derive(Clone, Default)]
pub struct InProcessEventBus {
    projections: Vec<Arc<dyn Projection>>,
}

impl InProcessEventBus {
    pub fn new(projections: Vec<Arc<dyn Projection>>) -> Self {
        Self { projections }
    }

    pub fn subscribe(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn subscribers(&self) -> Vec<&'static str> {
        self.projections.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn publish(&self, events: &[EventEnvelope]) -> PublishReport {
        let mut report = PublishReport {
            events: events.len(),
            ..Default::default()
        };

        for event in events {
            for projection in self.projections.iter().filter(|p| p.handles(event)) {
                match deliver(projection.as_ref(), event).await {
                    Ok(_) => report.deliveries += 1,
                    Err(e) => report.failures.push(failure(projection.name(), event, e)),
                }
            }
        }
        report
    }
}

enum Delivery {
    Event(Arc<EventEnvelope>),
    Flush(oneshot::Sender<()>),
    Stop,
}

struct Worker {
    projection: Arc<dyn Projection>,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// One FIFO queue and worker task per projection.
pub struct ChannelEventBus {
    workers: Vec<Worker>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelEventBus {
    /// Starts one worker per projection. Must be called within a tokio
    /// runtime.
    pub fn spawn(projections: Vec<Arc<dyn Projection>>) -> Self {
        let mut workers = Vec::with_capacity(projections.len());
        let mut handles = Vec::with_capacity(projections.len());

        for projection in projections {
            let (sender, receiver) = mpsc::unbounded_channel();
            handles.push(tokio::spawn(run_worker(Arc::clone(&projection), receiver)));
            workers.push(Worker { projection, sender });
        }

        Self {
            workers,
            handles: Mutex::new(handles),
        }
    }

    pub fn subscribers(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.projection.name()).collect()
    }

    /// Waits until every event published before this call has been handed
    /// to its projection.
    pub async fn flush(&self) {
        let mut pending = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let (done, wait) = oneshot::channel();
            if worker.sender.send(Delivery::Flush(done)).is_ok() {
                pending.push(wait);
            }
        }
        for wait in pending {
            // A worker that already stopped has nothing left to flush.
            let _ = wait.await;
        }
    }

    /// Drains every queue, then stops the workers. Later publishes report
    /// every delivery as failed.
    pub async fn shutdown(&self) {
        for worker in &self.workers {
            let _ = worker.sender.send(Delivery::Stop);
        }
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "projection worker panicked");
            }
        }
    }
}

async fn run_worker(
    projection: Arc<dyn Projection>,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
) {
    tracing::debug!(projection = projection.name(), "projection worker started");

    while let Some(delivery) = receiver.recv().await {
        match delivery {
            Delivery::Event(event) => {
                // Failures are logged and counted inside deliver.
                let _ = deliver(projection.as_ref(), &event).await;
            }
            Delivery::Flush(done) => {
                let _ = done.send(());
            }
            Delivery::Stop => break,
        }
    }

    tracing::debug!(projection = projection.name(), "projection worker stopped");
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, events: &[EventEnvelope]) -> PublishReport {
        let mut report = PublishReport {
            events: events.len(),
            ..Default::default()
        };

        for event in events {
            let shared = Arc::new(event.clone());
            for worker in self.workers.iter().filter(|w| w.projection.handles(event)) {
                match worker.sender.send(Delivery::Event(Arc::clone(&shared))) {
                    Ok(()) => report.deliveries += 1,
                    Err(_) => report.failures.push(failure(
                        worker.projection.name(),
                        event,
                        "projection worker stopped",
                    )),
                }
            }
        }
        report
    }
}
