use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{
    AggregateId, Commit, CommitId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
};

/// What the writer believes the stream looks like before its append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// No check beyond the batch continuing the stream.
    #[default]
    Any,
    /// The stream must be empty.
    NoStream,
    /// The stream's last event must carry exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Expectation matching an aggregate loaded at `version`.
    pub fn from_loaded(version: Option<Version>) -> Self {
        version.map_or(Self::NoStream, Self::Exact)
    }

    fn matches(&self, actual: Option<Version>) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => actual.is_none(),
            Self::Exact(v) => actual == Some(*v),
        }
    }
}

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    pub expected_version: ExpectedVersion,
}

impl AppendOptions {
    /// Options with no expectation about the current stream version.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: ExpectedVersion::Exact(version),
        }
    }

    /// The aggregate must not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: ExpectedVersion::NoStream,
        }
    }

    pub fn expect(expected_version: ExpectedVersion) -> Self {
        Self { expected_version }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// The event log: append-only commits per stream, ranged reads, snapshots,
/// and the bookkeeping needed to redeliver commits to the dispatcher.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` as a single commit.
    ///
    /// The batch must belong to one stream and continue it exactly: its first
    /// version must be the stream's next version. A batch that does not, or
    /// that fails `options.expected_version`, is rejected with
    /// `ConcurrencyConflict` and nothing is written.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Commit>;

    /// Events of one stream with `from <= version <= to`, in version order.
    ///
    /// A gap in the returned run is reported as `CorruptStream`.
    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Streams every event in the store in append order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Version of the last event on the stream, `None` if it is empty.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Stores a snapshot. A snapshot at the same version is replaced.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Newest snapshot of the stream whose version is at most `max_version`.
    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        max_version: Version,
    ) -> Result<Option<Snapshot>>;

    /// Commits whose delivery has not been confirmed, oldest first.
    async fn get_undispatched_commits(&self) -> Result<Vec<Commit>>;

    /// Records that `commit_id` was delivered by the dispatcher.
    async fn mark_commit_dispatched(&self, commit_id: CommitId) -> Result<()>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Every event of the stream from its first version on.
    async fn get_all_events(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.get_events(aggregate_id, Version::first(), Version::MAX)
            .await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch can form a commit: non-empty, one stream, contiguous
/// ascending versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty commit".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events of a commit must belong to the same stream".to_string(),
            ));
        }
        expected_version = expected_version.checked_next().ok_or_else(|| {
            EventStoreError::InvalidAppend(format!("no version follows {expected_version}"))
        })?;
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

/// Compares the stream's current version against the writer's expectation
/// and the batch's first version.
pub fn check_append_position(
    aggregate_id: AggregateId,
    current: Option<Version>,
    first_new: Version,
    expected: ExpectedVersion,
) -> Result<()> {
    let next = match current {
        Some(v) => v.checked_next(),
        None => Some(Version::first()),
    };
    if !expected.matches(current) || next != Some(first_new) {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: match expected {
                ExpectedVersion::Exact(v) => Some(v),
                ExpectedVersion::NoStream => None,
                ExpectedVersion::Any => first_new.previous(),
            },
            actual: current,
        });
    }
    Ok(())
}

/// Verifies that a fetched range starts at `from` and has no holes.
pub fn ensure_contiguous(
    aggregate_id: AggregateId,
    from: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    let mut expected = Some(from);
    for event in events {
        match expected {
            Some(v) if event.version == v && event.aggregate_id == aggregate_id => {
                expected = v.checked_next();
            }
            _ => {
                return Err(EventStoreError::CorruptStream {
                    aggregate_id,
                    expected: expected.unwrap_or(Version::MAX),
                    found: event.version,
                });
            }
        }
    }
    Ok(())
}
