//! Core aggregate and domain event traits, and the aggregate root that
//! carries version bookkeeping around a domain state.

use chrono::{DateTime, Utc};
use common::{AggregateId, Issuer};
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::AggregateError;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + std::fmt::Debug {
    /// Returns the event type name.
    ///
    /// This is the tag stored with the event and used to route it to
    /// projections.
    fn event_type(&self) -> &'static str;
}

/// Domain state of an event-sourced entity.
///
/// Implementations hold only business fields. Identity, versions and the
/// uncommitted list live in [`AggregateRoot`].
///
/// Business methods take `&self`, check their rules against the current
/// state and return the events to record. They never mutate; the root
/// applies the returned events.
pub trait Aggregate: Default + Serialize + Send + Sync + Sized + 'static {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's business rules produce.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Applies an event to the state.
    ///
    /// Must be pure and deterministic, and must not fail: events are facts.
    fn apply(&mut self, event: &Self::Event);

    /// Structural invariants of the current state.
    fn validate(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Returns true if `event` soft-deletes the aggregate.
    fn is_deletion(_event: &Self::Event) -> bool {
        false
    }

    /// The event recorded by [`AggregateRoot::mark_as_deleted`], if this
    /// aggregate type supports soft deletion.
    fn deletion_event(&self) -> Option<Self::Event> {
        None
    }
}

/// An event produced during this use of the aggregate and not yet saved.
#[derive(Debug, Clone)]
pub struct RecordedEvent<E> {
    pub event: E,
    pub version: Version,
    pub issuer: Issuer,
    pub timestamp: DateTime<Utc>,
}

/// One aggregate instance: identity, versions, uncommitted changes and
/// the soft-delete flag around the domain state `A`.
///
/// A root is owned by a single command execution and is never shared.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: AggregateId,
    original_version: Version,
    current_version: Version,
    uncommitted: Vec<RecordedEvent<A::Event>>,
    is_deleted: bool,
    issuer: Issuer,
    state: A,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// A fresh aggregate at version 0.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            original_version: Version::initial(),
            current_version: Version::initial(),
            uncommitted: Vec::new(),
            is_deleted: false,
            issuer: Issuer::System,
            state: A::default(),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn aggregate_type(&self) -> &'static str {
        A::aggregate_type()
    }

    /// Version as loaded from storage, or 0 for a new instance.
    pub fn original_version(&self) -> Version {
        self.original_version
    }

    /// Version after applying any new events.
    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// Sets who is responsible for the events recorded from now on.
    pub fn set_issuer(&mut self, issuer: Issuer) {
        self.issuer = issuer;
    }

    pub fn uncommitted_changes(&self) -> &[RecordedEvent<A::Event>] {
        &self.uncommitted
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Applies `event` to the state and advances the current version.
    ///
    /// With `is_new` the event is also recorded as uncommitted. Replay
    /// passes `false`.
    pub fn apply(&mut self, event: A::Event, is_new: bool) {
        self.state.apply(&event);
        if A::is_deletion(&event) {
            self.is_deleted = true;
        }
        self.current_version = self.current_version.next();

        if is_new {
            self.uncommitted.push(RecordedEvent {
                event,
                version: self.current_version,
                issuer: self.issuer.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Runs a business method and applies the events it returns.
    ///
    /// Fails without touching the root if the aggregate is deleted or the
    /// method rejects the operation. Returns the number of events recorded.
    pub fn execute<F>(&mut self, business_method: F) -> Result<usize, AggregateError<A::Error>>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        self.ensure_not_deleted()?;

        let events = business_method(&self.state).map_err(AggregateError::Rule)?;
        let count = events.len();
        for event in events {
            self.apply(event, true);
        }
        Ok(count)
    }

    /// Records the aggregate's deletion event. Deletion is terminal.
    pub fn mark_as_deleted(&mut self) -> Result<(), AggregateError<A::Error>> {
        self.ensure_not_deleted()?;

        let event = self
            .state
            .deletion_event()
            .ok_or(AggregateError::DeleteUnsupported {
                aggregate_type: A::aggregate_type(),
            })?;
        self.apply(event, true);
        self.is_deleted = true;
        Ok(())
    }

    /// Read-only structural check of the current state.
    pub fn validate(&self) -> Result<(), AggregateError<A::Error>> {
        self.state.validate().map_err(AggregateError::Rule)
    }

    /// Clears uncommitted changes after a successful save.
    pub(crate) fn mark_committed(&mut self) {
        self.original_version = self.current_version;
        self.uncommitted.clear();
    }

    fn ensure_not_deleted(&self) -> Result<(), AggregateError<A::Error>> {
        if self.is_deleted {
            return Err(AggregateError::Deleted {
                aggregate_type: A::aggregate_type(),
                aggregate_id: self.id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    pub enum CounterEvent {
        Opened { limit: u32 },
        Incremented { by: u32 },
        Closed,
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Incremented { .. } => "CounterIncremented",
                CounterEvent::Closed => "CounterClosed",
            }
        }
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    pub enum CounterError {
        #[error("counter already opened")]
        AlreadyOpened,
        #[error("counter not opened")]
        NotOpened,
        #[error("would exceed limit")]
        OverLimit,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize)]
    pub struct Counter {
        pub opened: bool,
        pub limit: u32,
        pub value: u32,
    }

    impl Counter {
        pub fn open(&self, limit: u32) -> Result<Vec<CounterEvent>, CounterError> {
            if self.opened {
                return Err(CounterError::AlreadyOpened);
            }
            Ok(vec![CounterEvent::Opened { limit }])
        }

        pub fn increment(&self, by: u32) -> Result<Vec<CounterEvent>, CounterError> {
            if !self.opened {
                return Err(CounterError::NotOpened);
            }
            if self.value + by > self.limit {
                return Err(CounterError::OverLimit);
            }
            Ok(vec![CounterEvent::Incremented { by }])
        }
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = CounterError;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn apply(&mut self, event: &CounterEvent) {
            match event {
                CounterEvent::Opened { limit } => {
                    self.opened = true;
                    self.limit = *limit;
                }
                CounterEvent::Incremented { by } => self.value += by,
                CounterEvent::Closed => {}
            }
        }

        fn validate(&self) -> Result<(), CounterError> {
            if self.value > self.limit {
                return Err(CounterError::OverLimit);
            }
            Ok(())
        }

        fn is_deletion(event: &CounterEvent) -> bool {
            matches!(event, CounterEvent::Closed)
        }

        fn deletion_event(&self) -> Option<CounterEvent> {
            Some(CounterEvent::Closed)
        }
    }

    #[test]
    fn new_root_starts_at_version_zero() {
        let root = AggregateRoot::<Counter>::new(AggregateId::new());
        assert_eq!(root.original_version(), Version::initial());
        assert_eq!(root.current_version(), Version::initial());
        assert!(!root.has_uncommitted_changes());
        assert!(!root.is_deleted());
    }

    #[test]
    fn new_events_are_recorded_and_versioned() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.set_issuer(Issuer::user("alice"));

        root.execute(|c| c.open(10)).unwrap();
        root.execute(|c| c.increment(3)).unwrap();

        assert_eq!(root.current_version(), Version::new(2));
        assert_eq!(root.original_version(), Version::initial());
        assert_eq!(root.state().value, 3);

        let versions: Vec<i64> = root
            .uncommitted_changes()
            .iter()
            .map(|r| r.version.as_i64())
            .collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(root.uncommitted_changes()[0].issuer, Issuer::user("alice"));
    }

    #[test]
    fn replay_advances_version_without_recording() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.apply(CounterEvent::Opened { limit: 5 }, false);
        root.apply(CounterEvent::Incremented { by: 2 }, false);

        assert_eq!(root.current_version(), Version::new(2));
        assert!(!root.has_uncommitted_changes());
        assert_eq!(root.state().value, 2);
    }

    #[test]
    fn rejected_business_method_changes_nothing() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.execute(|c| c.open(5)).unwrap();

        let err = root.execute(|c| c.increment(6)).unwrap_err();
        assert!(matches!(err, AggregateError::Rule(CounterError::OverLimit)));
        assert_eq!(root.current_version(), Version::new(1));
        assert_eq!(root.uncommitted_changes().len(), 1);
    }

    #[test]
    fn deletion_is_terminal() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.execute(|c| c.open(5)).unwrap();
        root.mark_as_deleted().unwrap();

        assert!(root.is_deleted());
        assert_eq!(root.current_version(), Version::new(2));

        assert!(matches!(
            root.execute(|c| c.increment(1)),
            Err(AggregateError::Deleted { .. })
        ));
        assert!(matches!(
            root.mark_as_deleted(),
            Err(AggregateError::Deleted { .. })
        ));
        assert_eq!(root.current_version(), Version::new(2));
    }

    #[test]
    fn replayed_deletion_sets_flag() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.apply(CounterEvent::Opened { limit: 5 }, false);
        root.apply(CounterEvent::Closed, false);
        assert!(root.is_deleted());
    }

    #[test]
    fn validate_reports_structural_violations() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.apply(CounterEvent::Opened { limit: 1 }, false);
        assert!(root.validate().is_ok());

        root.apply(CounterEvent::Incremented { by: 4 }, false);
        assert!(root.validate().is_err());
    }

    #[test]
    fn mark_committed_moves_original_version() {
        let mut root = AggregateRoot::<Counter>::new(AggregateId::new());
        root.execute(|c| c.open(5)).unwrap();
        root.mark_committed();

        assert_eq!(root.original_version(), Version::new(1));
        assert!(!root.has_uncommitted_changes());
    }
}
