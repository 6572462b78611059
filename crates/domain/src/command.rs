//! Command handling infrastructure.

use common::AggregateId;
use event_store::{AppendOptions, Commit, EventEnvelope, EventStore, ExpectedVersion};

use crate::aggregate::{Aggregate, AggregateRoot, DomainEvent, SnapshotPolicy};
use crate::error::DomainError;
use crate::reconstruct::Reconstructor;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: AggregateRoot<A>,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The commit holding `events`; `None` when the command produced nothing.
    pub commit: Option<Commit>,
}

/// Handler for executing commands against aggregates.
///
/// The handler:
/// 1. Reconstructs the aggregate (or starts an empty one for a new stream)
/// 2. Lets the command record events through the intent operations
/// 3. Appends them as one commit, expecting the version it loaded
/// 4. Saves a snapshot when the [`SnapshotPolicy`] asks for one
///
/// A concurrent append surfaces as [`DomainError::ConcurrencyConflict`]; the
/// handler never retries on its own.
pub struct CommandHandler<S, A> {
    reconstructor: Reconstructor<S, A>,
    snapshot_policy: SnapshotPolicy,
}

impl<S: EventStore, A: Aggregate> CommandHandler<S, A> {
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            reconstructor: Reconstructor::new(store),
            snapshot_policy: SnapshotPolicy::default(),
        }
    }

    pub fn with_snapshot_policy(mut self, snapshot_policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = snapshot_policy;
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        self.reconstructor.store()
    }

    pub fn reconstructor(&self) -> &Reconstructor<S, A> {
        &self.reconstructor
    }

    /// Runs `command_fn` against aggregate `aggregate_id` and persists what
    /// it recorded.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&mut AggregateRoot<A>) -> Result<(), DomainError>,
    {
        let mut aggregate = self
            .reconstructor
            .reconstruct_if_exists(aggregate_id)
            .await?
            .unwrap_or_else(|| AggregateRoot::for_stream(aggregate_id));
        let loaded_version = aggregate.version();

        command_fn(&mut aggregate)?;

        let events = aggregate.take_uncommitted();
        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                commit: None,
            });
        }

        let envelopes = build_envelopes::<A>(&events)?;
        let commit = self
            .store()
            .append(
                envelopes,
                AppendOptions::expect(ExpectedVersion::from_loaded(loaded_version)),
            )
            .await?;

        if self
            .snapshot_policy
            .should_snapshot(loaded_version, commit.stream_revision)
        {
            self.save_snapshot(&aggregate).await;
        }

        Ok(CommandResult {
            aggregate,
            events,
            commit: Some(commit),
        })
    }

    /// Snapshots only shorten replay; a failed save leaves the commit intact.
    async fn save_snapshot(&self, aggregate: &AggregateRoot<A>) {
        let result = match aggregate.to_snapshot() {
            Ok(Some(snapshot)) => self.store().save_snapshot(snapshot).await.map_err(DomainError::from),
            Ok(None) => Ok(()),
            Err(e) => Err(e.into()),
        };
        if let Err(error) = result {
            tracing::warn!(aggregate_id = ?aggregate.id(), %error, "failed to save snapshot");
        }
    }
}

/// Wraps recorded events for the store.
fn build_envelopes<A: Aggregate>(events: &[A::Event]) -> Result<Vec<EventEnvelope>, DomainError> {
    events
        .iter()
        .map(|event| {
            EventEnvelope::builder()
                .aggregate_id(event.aggregate_id())
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(event.version())
                .payload(event)
                .map(|builder| builder.build())?
                .ok_or_else(|| DomainError::CorruptStream {
                    aggregate_id: event.aggregate_id(),
                    reason: "incomplete event envelope".to_string(),
                })
        })
        .collect()
}
