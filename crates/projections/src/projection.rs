//! Core projection trait.

use async_trait::async_trait;
use event_store::{EventEnvelope, EventQuery, EventStore, Version};

use crate::{ProjectionError, Result};

/// What a projection did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The read model was updated.
    Applied,
    /// The event's version was already folded in.
    Skipped,
    /// The event is of no interest to this projection.
    Ignored,
}

/// Counts from one [`Projection::rebuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub events: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// A named, versioned event subscriber that maintains read models.
///
/// `project` is called with each aggregate's events in version order and
/// must treat an event whose version is not greater than the stored
/// model's version as a no-op, so redelivery is harmless. Models folded
/// from one stream refuse to skip versions; see [`is_next`].
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Bumped whenever the read-model shape or folding logic changes; a
    /// mismatch against the stored checkpoint triggers a rebuild.
    fn version(&self) -> u32 {
        1
    }

    /// Aggregate types whose events this projection folds.
    fn aggregate_types(&self) -> &'static [&'static str];

    fn can_handle(&self, event_type: &str) -> bool;

    async fn project(&self, event: &EventEnvelope) -> Result<ProjectionOutcome>;

    /// Removes every read model this projection owns.
    async fn reset(&self) -> Result<()>;

    /// Resets, then replays the full history of the declared aggregate
    /// types in commit order. Safe to re-run after a partial failure.
    async fn rebuild(&self, source: &dyn EventStore) -> Result<RebuildReport> {
        self.reset().await?;

        let history = source
            .query_events(EventQuery::for_aggregate_types(
                self.aggregate_types().iter().copied(),
            ))
            .await?;

        let mut report = RebuildReport::default();
        for event in history.iter().filter(|e| self.handles(e)) {
            report.events += 1;
            match self.project(event).await? {
                ProjectionOutcome::Applied => report.applied += 1,
                ProjectionOutcome::Skipped => report.skipped += 1,
                ProjectionOutcome::Ignored => {}
            }
        }
        Ok(report)
    }

    /// Returns true if `event` should be delivered to this projection.
    fn handles(&self, event: &EventEnvelope) -> bool {
        self.aggregate_types()
            .contains(&event.aggregate_type.as_str())
            && self.can_handle(&event.event_type)
    }
}

/// Checks `event` against the version a single-stream model has folded.
///
/// `Ok(false)` means `stored` already covers the event (redelivery),
/// `Ok(true)` means it is the next version. Anything further ahead is a
/// [`ProjectionError::VersionGap`]: an earlier delivery failed, and the
/// model stays behind and keeps failing until the missing versions are
/// replayed by a catch-up or a rebuild.
pub fn is_next(stored: Option<Version>, event: &EventEnvelope) -> Result<bool> {
    let expected = stored.map_or_else(Version::first, |version| version.next());
    if event.version < expected {
        return Ok(false);
    }
    if event.version > expected {
        return Err(ProjectionError::VersionGap {
            aggregate_id: event.aggregate_id.to_string(),
            expected,
            received: event.version,
        });
    }
    Ok(true)
}
