use crate::{AggregateId, EventEnvelope};

/// Filter over the global event log.
///
/// Results are always returned in commit order. `after_sequence` together
/// with `limit` lets a consumer page through the log.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by aggregate ID.
    pub aggregate_id: Option<AggregateId>,

    /// Filter by aggregate types (any of these types).
    pub aggregate_types: Option<Vec<String>>,

    /// Filter by event types (any of these types).
    pub event_types: Option<Vec<String>>,

    /// Only events committed after this sequence (exclusive).
    pub after_sequence: Option<i64>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a specific aggregate.
    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    /// Creates a query for every event of the given aggregate types.
    pub fn for_aggregate_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            aggregate_types: Some(types.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Filters by event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    /// Only returns events committed after this sequence.
    pub fn after_sequence(mut self, sequence: i64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    /// Limits the number of events returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the event passes every filter of this query.
    ///
    /// `limit` is not a filter and is applied by the caller.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        if let Some(id) = self.aggregate_id
            && event.aggregate_id != id
        {
            return false;
        }
        if let Some(ref types) = self.aggregate_types
            && !types.contains(&event.aggregate_type)
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }
        if let Some(after) = self.after_sequence
            && event.sequence <= after
        {
            return false;
        }
        true
    }
}
