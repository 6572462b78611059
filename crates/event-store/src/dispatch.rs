//! Hand-off of durable commits to a dispatcher.
//!
//! The log calls the dispatcher right after a commit is durable. A commit is
//! recorded as dispatched only once it has been delivered: immediately when
//! the dispatcher answers [`Handoff::Delivered`], or later through a
//! [`DispatchLedger`] when it answers [`Handoff::Queued`]. Commits that were
//! refused, queued but never delivered, or lost to a crash stay undispatched
//! and are handed off again by [`DispatchingEventStore::redispatch_pending`],
//! so downstream delivery is at-least-once.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    AggregateId, Commit, CommitId, EventEnvelope, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, EventStream},
};

/// Why a dispatcher refused a commit.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts work.
    #[error("dispatcher is closed")]
    Closed,

    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

/// How far a dispatcher got with a commit by the time `dispatch` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Every event reached the consumer; the log may mark the commit.
    Delivered,
    /// Accepted for later delivery. The dispatcher confirms it through a
    /// [`DispatchLedger`] once delivered; until then it stays pending.
    Queued,
}

/// Receives every commit the log makes durable.
#[async_trait]
pub trait DispatchCommits: Send + Sync {
    async fn dispatch(&self, commit: Commit) -> std::result::Result<Handoff, DispatchError>;
}

#[async_trait]
impl<T: DispatchCommits + ?Sized> DispatchCommits for Arc<T> {
    async fn dispatch(&self, commit: Commit) -> std::result::Result<Handoff, DispatchError> {
        (**self).dispatch(commit).await
    }
}

/// Where a dispatcher confirms commits it delivered after queueing them.
#[async_trait]
pub trait DispatchLedger: Send + Sync {
    async fn confirm_dispatched(&self, commit_id: CommitId) -> Result<()>;
}

#[async_trait]
impl<S: EventStore + ?Sized> DispatchLedger for S {
    async fn confirm_dispatched(&self, commit_id: CommitId) -> Result<()> {
        self.mark_commit_dispatched(commit_id).await
    }
}

/// An event store that forwards each new commit to a dispatcher.
///
/// Appends never fail because of the dispatcher: a refused hand-off is
/// logged and the commit is left for [`redispatch_pending`](Self::redispatch_pending).
#[derive(Clone)]
pub struct DispatchingEventStore<S> {
    inner: S,
    dispatcher: Arc<dyn DispatchCommits>,
}

impl<S: EventStore> DispatchingEventStore<S> {
    pub fn new(inner: S, dispatcher: Arc<dyn DispatchCommits>) -> Self {
        Self { inner, dispatcher }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Hands every undispatched commit to the dispatcher again, oldest first.
    ///
    /// Returns how many commits were delivered or queued.
    #[tracing::instrument(skip(self))]
    pub async fn redispatch_pending(&self) -> Result<usize> {
        let pending = self.inner.get_undispatched_commits().await?;
        let mut accepted = 0;
        for commit in pending {
            if self.hand_off(commit).await? {
                accepted += 1;
            }
        }
        if accepted > 0 {
            tracing::info!(accepted, "redispatched pending commits");
        }
        Ok(accepted)
    }

    async fn hand_off(&self, commit: Commit) -> Result<bool> {
        let commit_id = commit.commit_id;
        let aggregate_id = commit.aggregate_id;
        match self.dispatcher.dispatch(commit).await {
            Ok(Handoff::Delivered) => {
                self.inner.mark_commit_dispatched(commit_id).await?;
                Ok(true)
            }
            Ok(Handoff::Queued) => Ok(true),
            Err(error) => {
                tracing::warn!(
                    %commit_id,
                    %aggregate_id,
                    %error,
                    "commit hand-off failed, left for redispatch"
                );
                metrics::counter!("event_store_dispatch_handoff_failures_total").increment(1);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl<S: EventStore> EventStore for DispatchingEventStore<S> {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Commit> {
        let commit = self.inner.append(events, options).await?;
        if let Err(error) = self.hand_off(commit.clone()).await {
            // The commit is durable; only the dispatched flag failed to stick.
            tracing::warn!(commit_id = %commit.commit_id, %error, "could not mark commit dispatched");
        }
        Ok(commit)
    }

    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Version,
    ) -> Result<Vec<EventEnvelope>> {
        self.inner.get_events(aggregate_id, from, to).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.inner.stream_all_events().await
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        self.inner.get_aggregate_version(aggregate_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.inner.save_snapshot(snapshot).await
    }

    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        max_version: Version,
    ) -> Result<Option<Snapshot>> {
        self.inner.get_snapshot(aggregate_id, max_version).await
    }

    async fn get_undispatched_commits(&self) -> Result<Vec<Commit>> {
        self.inner.get_undispatched_commits().await
    }

    async fn mark_commit_dispatched(&self, commit_id: CommitId) -> Result<()> {
        self.inner.mark_commit_dispatched(commit_id).await
    }
}
