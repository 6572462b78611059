//! Projection processor for feeding events to projections.

use event_store::{Commit, EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Processes events from an event store and delivers them to projections.
///
/// The processor supports:
/// - Catch-up: replays the whole log, skipping events a projection has seen
/// - Commit delivery: applies a freshly dispatched commit
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams all events from the store and delivers each one to every
    /// projection that has not seen its stream version yet.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut applied: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            applied += self.deliver(&event).await?;
        }

        tracing::info!(events_applied = applied, "catch-up complete");
        Ok(applied)
    }

    /// Delivers every event of a commit. Redelivered commits are no-ops.
    #[tracing::instrument(skip(self, commit), fields(commit_id = %commit.commit_id, aggregate_id = %commit.aggregate_id))]
    pub async fn process_commit(&self, commit: &Commit) -> Result<u64> {
        let mut applied = 0;
        for event in &commit.events {
            applied += self.deliver(event).await?;
        }
        Ok(applied)
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }

    async fn deliver(&self, event: &EventEnvelope) -> Result<u64> {
        let mut applied = 0;
        for projection in &self.projections {
            let fresh = projection
                .last_seen(event.aggregate_id)
                .await
                .is_none_or(|seen| event.version > seen);
            if fresh {
                projection.handle(event).await?;
                metrics::counter!("projections_events_processed", "projection" => projection.name())
                    .increment(1);
                applied += 1;
            }
        }
        Ok(applied)
    }
}
