//! The outward-facing form of a committed event.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{Commit, CommitId, EventEnvelope, EventId, Version};
use serde::{Deserialize, Serialize};

/// One committed event as consumers receive it.
///
/// A copy of the stored envelope plus the commit it arrived in; building one
/// never touches the committed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub commit_id: CommitId,
    /// Version of the last event in the commit.
    pub stream_revision: Version,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    pub fn from_commit_event(commit: &Commit, envelope: &EventEnvelope) -> Self {
        Self {
            event_id: envelope.event_id,
            event_type: envelope.event_type.clone(),
            aggregate_id: envelope.aggregate_id,
            aggregate_type: envelope.aggregate_type.clone(),
            version: envelope.version,
            timestamp: envelope.timestamp,
            commit_id: commit.commit_id,
            stream_revision: commit.stream_revision,
            payload: envelope.payload.clone(),
            metadata: envelope.metadata.clone(),
        }
    }

    /// Transport-agnostic JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
