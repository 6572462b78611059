//! Aggregate driver and the traits aggregates plug into it.
//!
//! An aggregate is written as a plain state struct implementing [`Aggregate`]:
//! how the creation event brings it to life and how every later event folds
//! into it. [`AggregateRoot`] owns everything else: the identity, the version
//! counter, the replay-integrity checks and the events recorded but not yet
//! persisted.

use common::AggregateId;
use event_store::{Snapshot, Version};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// The stream this event belongs to.
    fn aggregate_id(&self) -> AggregateId;

    /// The version this event establishes on its stream.
    fn version(&self) -> Version;
}

/// State of an event-sourced entity.
///
/// Both methods must be pure and deterministic: replaying the same events
/// always yields the same state.
pub trait Aggregate: Serialize + DeserializeOwned + Clone + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    ///
    /// Used for event store organization and routing.
    fn aggregate_type() -> &'static str;

    /// Builds the state from the stream's first event.
    ///
    /// Only the creation event succeeds; any other event fails with
    /// [`AggregateError::Uninitialized`].
    fn init(event: &Self::Event) -> Result<Self, AggregateError>;

    /// Folds a later event into the state.
    fn apply(&mut self, event: &Self::Event) -> Result<(), AggregateError>;
}

/// Errors raised while applying events to an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// An event other than the creation event reached an aggregate that was
    /// never created.
    #[error("cannot apply {event_type} to an uninitialized aggregate")]
    Uninitialized { event_type: &'static str },

    #[error("aggregate {aggregate_id} already created")]
    AlreadyCreated { aggregate_id: AggregateId },

    /// The event does not carry the version following the current one.
    #[error("version mismatch: expected {expected}, event carries {actual}")]
    VersionMismatch { expected: Version, actual: Version },

    #[error("event for aggregate {actual} applied to aggregate {expected}")]
    AggregateMismatch {
        expected: AggregateId,
        actual: AggregateId,
    },

    #[error("no version follows {last}")]
    VersionExhausted { last: Version },
}

/// Drives an [`Aggregate`] through its events.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: Option<AggregateId>,
    version: Option<Version>,
    state: Option<A>,
    uncommitted: Vec<A::Event>,
}

impl<A: Aggregate> Default for AggregateRoot<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> AggregateRoot<A> {
    /// An empty root; the creation event assigns its identity.
    pub fn new() -> Self {
        Self {
            id: None,
            version: None,
            state: None,
            uncommitted: Vec::new(),
        }
    }

    /// An empty root that only accepts events of stream `id`.
    pub fn for_stream(id: AggregateId) -> Self {
        Self {
            id: Some(id),
            ..Self::new()
        }
    }

    pub fn id(&self) -> Option<AggregateId> {
        self.id
    }

    /// Version of the last applied event, `None` before the first.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Version the next event must carry.
    pub fn next_version(&self) -> Version {
        Version::after(self.version)
    }

    pub fn state(&self) -> Option<&A> {
        self.state.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.state.is_some()
    }

    /// Events recorded since the root was loaded.
    pub fn uncommitted(&self) -> &[A::Event] {
        &self.uncommitted
    }

    pub fn take_uncommitted(&mut self) -> Vec<A::Event> {
        std::mem::take(&mut self.uncommitted)
    }

    /// Folds one event into the aggregate.
    ///
    /// The event must belong to this stream and carry exactly
    /// [`next_version`](Self::next_version). On error the root is unchanged.
    pub fn apply(&mut self, event: &A::Event) -> Result<(), AggregateError> {
        if let Some(expected) = self.id
            && event.aggregate_id() != expected
        {
            return Err(AggregateError::AggregateMismatch {
                expected,
                actual: event.aggregate_id(),
            });
        }

        if let Some(last) = self.version
            && last.checked_next().is_none()
        {
            return Err(AggregateError::VersionExhausted { last });
        }
        let expected = self.next_version();
        if event.version() != expected {
            return Err(AggregateError::VersionMismatch {
                expected,
                actual: event.version(),
            });
        }

        match self.state.as_mut() {
            Some(state) => state.apply(event)?,
            None => self.state = Some(A::init(event)?),
        }
        self.id = Some(event.aggregate_id());
        self.version = Some(expected);
        Ok(())
    }

    /// Applies a freshly produced event and keeps it for persistence.
    pub fn record(&mut self, event: A::Event) -> Result<(), AggregateError> {
        self.apply(&event)?;
        self.uncommitted.push(event);
        Ok(())
    }

    /// Replays historical events in order.
    pub fn load_from_history<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a A::Event>,
    ) -> Result<(), AggregateError>
    where
        A::Event: 'a,
    {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Captures the current state, or `None` if the aggregate was never
    /// created.
    pub fn to_snapshot(&self) -> Result<Option<Snapshot>, serde_json::Error> {
        match (self.id, self.version, &self.state) {
            (Some(id), Some(version), Some(state)) => Ok(Some(Snapshot::from_state(
                id,
                A::aggregate_type(),
                version,
                state,
            )?)),
            _ => Ok(None),
        }
    }

    /// Restores a root from a snapshot; replay continues after the
    /// snapshot's version.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, serde_json::Error> {
        let id = snapshot.aggregate_id;
        let version = snapshot.version;
        let state: A = snapshot.into_state()?;
        Ok(Self {
            id: Some(id),
            version: Some(version),
            state: Some(state),
            uncommitted: Vec::new(),
        })
    }
}

/// When the command side stores snapshots.
///
/// With an interval of `n`, a snapshot is taken whenever a commit brings the
/// stream's event count to a multiple of `n`, or past one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    interval: u64,
}

impl SnapshotPolicy {
    pub fn every(interval: u64) -> Self {
        Self { interval }
    }

    pub fn disabled() -> Self {
        Self { interval: 0 }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Whether a commit moving the stream from `before` to `after` should be
    /// followed by a snapshot.
    pub fn should_snapshot(&self, before: Option<Version>, after: Version) -> bool {
        if self.interval == 0 {
            return false;
        }
        let count_before = Version::after(before).as_i64() as u64;
        let count_after = after.as_i64() as u64 + 1;
        count_after / self.interval > count_before / self.interval
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::every(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId, version: Version },
        Added { id: AggregateId, version: Version, amount: i64 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Added { .. } => "CounterAdded",
            }
        }

        fn aggregate_id(&self) -> AggregateId {
            match self {
                CounterEvent::Opened { id, .. } | CounterEvent::Added { id, .. } => *id,
            }
        }

        fn version(&self) -> Version {
            match self {
                CounterEvent::Opened { version, .. } | CounterEvent::Added { version, .. } => {
                    *version
                }
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        total: i64,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn init(event: &CounterEvent) -> Result<Self, AggregateError> {
            match event {
                CounterEvent::Opened { .. } => Ok(Counter { total: 0 }),
                other => Err(AggregateError::Uninitialized {
                    event_type: other.event_type(),
                }),
            }
        }

        fn apply(&mut self, event: &CounterEvent) -> Result<(), AggregateError> {
            match event {
                CounterEvent::Opened { id, .. } => {
                    Err(AggregateError::AlreadyCreated { aggregate_id: *id })
                }
                CounterEvent::Added { amount, .. } => {
                    self.total += amount;
                    Ok(())
                }
            }
        }
    }

    fn opened(id: AggregateId) -> CounterEvent {
        CounterEvent::Opened {
            id,
            version: Version::first(),
        }
    }

    fn added(id: AggregateId, version: i64, amount: i64) -> CounterEvent {
        CounterEvent::Added {
            id,
            version: Version::new(version),
            amount,
        }
    }

    #[test]
    fn replay_advances_version_per_event() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<Counter>::new();
        assert_eq!(root.version(), None);
        assert_eq!(root.next_version(), Version::first());

        root.load_from_history(&[opened(id), added(id, 1, 5), added(id, 2, 7)])
            .unwrap();

        assert_eq!(root.id(), Some(id));
        assert_eq!(root.version(), Some(Version::new(2)));
        assert_eq!(root.state().unwrap().total, 12);
        assert!(root.uncommitted().is_empty());
    }

    #[test]
    fn out_of_order_event_is_rejected() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<Counter>::new();
        root.apply(&opened(id)).unwrap();

        let err = root.apply(&added(id, 2, 1)).unwrap_err();
        assert_eq!(
            err,
            AggregateError::VersionMismatch {
                expected: Version::new(1),
                actual: Version::new(2),
            }
        );
        assert_eq!(root.version(), Some(Version::first()));
    }

    #[test]
    fn change_before_creation_is_uninitialized() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<Counter>::for_stream(id);

        let err = root.apply(&added(id, 0, 1)).unwrap_err();
        assert!(matches!(err, AggregateError::Uninitialized { .. }));
        assert!(!root.is_created());
    }

    #[test]
    fn foreign_event_is_rejected() {
        let mut root = AggregateRoot::<Counter>::for_stream(AggregateId::new());
        let err = root.apply(&opened(AggregateId::new())).unwrap_err();
        assert!(matches!(err, AggregateError::AggregateMismatch { .. }));
    }

    #[test]
    fn recorded_events_are_taken_once() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<Counter>::new();
        root.record(opened(id)).unwrap();
        root.record(added(id, 1, 3)).unwrap();

        assert_eq!(root.take_uncommitted().len(), 2);
        assert!(root.take_uncommitted().is_empty());
        assert_eq!(root.state().unwrap().total, 3);
    }

    #[test]
    fn snapshot_restores_state_and_version() {
        let id = AggregateId::new();
        let mut root = AggregateRoot::<Counter>::new();
        root.load_from_history(&[opened(id), added(id, 1, 4)]).unwrap();

        let snapshot = root.to_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(1));
        assert_eq!(snapshot.aggregate_type, "Counter");

        let mut restored = AggregateRoot::<Counter>::from_snapshot(snapshot).unwrap();
        restored.apply(&added(id, 2, 1)).unwrap();
        assert_eq!(restored.state().unwrap().total, 5);
        assert_eq!(restored.version(), Some(Version::new(2)));
    }

    #[test]
    fn root_at_last_version_accepts_nothing_more() {
        let id = AggregateId::new();
        let snapshot = Snapshot::new(id, "Counter", Version::MAX, serde_json::json!({"total": 1}));
        let mut root = AggregateRoot::<Counter>::from_snapshot(snapshot).unwrap();

        let err = root.apply(&added(id, Version::MAX.as_i64(), 1)).unwrap_err();
        assert_eq!(err, AggregateError::VersionExhausted { last: Version::MAX });
        assert_eq!(root.state().unwrap().total, 1);
    }

    #[test]
    fn empty_root_has_no_snapshot() {
        assert!(AggregateRoot::<Counter>::new().to_snapshot().unwrap().is_none());
    }

    #[test]
    fn snapshot_policy_triggers_on_interval_boundaries() {
        let policy = SnapshotPolicy::every(3);
        assert!(!policy.should_snapshot(None, Version::new(1)));
        assert!(policy.should_snapshot(Some(Version::new(1)), Version::new(2)));
        assert!(!policy.should_snapshot(Some(Version::new(2)), Version::new(3)));
        // A commit jumping over a boundary still snapshots.
        assert!(policy.should_snapshot(Some(Version::new(3)), Version::new(6)));

        assert!(!SnapshotPolicy::disabled().should_snapshot(None, Version::new(99)));
    }
}
