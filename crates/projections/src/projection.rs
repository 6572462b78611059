//! Core projection trait and per-stream position tracking.

use std::collections::HashMap;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{EventEnvelope, Version};

use crate::Result;

/// Last version each stream has contributed to a projection.
///
/// Commits may be delivered more than once, so a projection only accepts an
/// event whose version is past what it has already seen for that stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPositions {
    seen: HashMap<AggregateId, Version>,
}

impl StreamPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self, aggregate_id: AggregateId) -> Option<Version> {
        self.seen.get(&aggregate_id).copied()
    }

    /// True when `version` has not been applied for `aggregate_id` yet.
    pub fn is_new(&self, aggregate_id: AggregateId, version: Version) -> bool {
        self.last_seen(aggregate_id).is_none_or(|seen| version > seen)
    }

    /// Records `version` if it is new. Returns whether it was.
    pub fn advance(&mut self, aggregate_id: AggregateId, version: Version) -> bool {
        if !self.is_new(aggregate_id, version) {
            return false;
        }
        self.seen.insert(aggregate_id, version);
        true
    }

    pub fn streams(&self) -> usize {
        self.seen.len()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// A projection that processes events and updates a read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Applies one event. Events at or below the stream's last seen version
    /// must be ignored.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Last version applied for `aggregate_id`.
    async fn last_seen(&self, aggregate_id: AggregateId) -> Option<Version>;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
