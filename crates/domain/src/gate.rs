//! Per-aggregate commit gate.
//!
//! The command handler holds a [`CommitPermit`] from just before `save` until
//! publish has returned, so two commands on the same aggregate hand their
//! events to the bus in commit order. Permits for different aggregates never
//! contend, and idle slots are dropped from the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::AggregateId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Mutex<HashMap<AggregateId, Arc<AsyncMutex<()>>>>;

#[derive(Clone, Default)]
pub struct CommitGate {
    slots: Arc<Slots>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other permit for `aggregate_id` is held.
    pub async fn enter(&self, aggregate_id: AggregateId) -> CommitPermit {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(aggregate_id).or_default())
        };
        let guard = slot.lock_owned().await;

        CommitPermit {
            slots: Arc::clone(&self.slots),
            aggregate_id,
            guard: Some(guard),
        }
    }

    /// Number of aggregates with a held or awaited permit.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held while one aggregate's save and publish run.
pub struct CommitPermit {
    slots: Arc<Slots>,
    aggregate_id: AggregateId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CommitPermit {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map itself still references an idle slot.
        if slots
            .get(&self.aggregate_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.aggregate_id);
        }
    }
}
