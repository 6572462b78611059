use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, EventEnvelope, Version};

/// Unique identifier for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(Uuid);

impl CommitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A batch of events appended atomically to one stream.
///
/// A commit is never empty and its events carry contiguous versions in
/// ascending order; `stream_revision` is the version of the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: CommitId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub stream_revision: Version,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<EventEnvelope>,
}

impl Commit {
    /// Wraps an already validated batch.
    pub(crate) fn from_events(events: Vec<EventEnvelope>) -> Self {
        let first = &events[0];
        let stream_revision = events[events.len() - 1].version;
        Self {
            commit_id: CommitId::new(),
            aggregate_id: first.aggregate_id,
            aggregate_type: first.aggregate_type.clone(),
            stream_revision,
            timestamp: Utc::now(),
            events,
        }
    }

    /// Version of the first event in the commit.
    pub fn first_version(&self) -> Version {
        self.events
            .first()
            .map(|e| e.version)
            .unwrap_or(self.stream_revision)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
