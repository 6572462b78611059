//! Rebuilding aggregates from the event log.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, Snapshot, Version};

use crate::aggregate::{Aggregate, AggregateRoot, DomainEvent};
use crate::error::DomainError;

/// Produces the current state of an aggregate from its latest snapshot and
/// the events recorded after it.
///
/// The result never depends on which snapshot (if any) was used: replaying the
/// whole stream gives the same root. Each call owns its root, so concurrent
/// reconstructions never share state.
pub struct Reconstructor<S, A> {
    store: S,
    _phantom: PhantomData<fn() -> A>,
}

impl<S: EventStore, A: Aggregate> Reconstructor<S, A> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds aggregate `id`; fails with `NotFound` for an unknown stream.
    pub async fn reconstruct(&self, id: AggregateId) -> Result<AggregateRoot<A>, DomainError> {
        self.reconstruct_if_exists(id)
            .await?
            .ok_or(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id,
            })
    }

    /// Rebuilds aggregate `id`, or `None` if its stream holds nothing.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn reconstruct_if_exists(
        &self,
        id: AggregateId,
    ) -> Result<Option<AggregateRoot<A>>, DomainError> {
        let (mut root, from) = match self.store.get_snapshot(id, Version::MAX).await? {
            Some(snapshot) => restore(id, snapshot)?,
            None => (AggregateRoot::for_stream(id), Version::first()),
        };

        let envelopes = self.store.get_events(id, from, Version::MAX).await?;
        let replayed = envelopes.len();
        for envelope in envelopes {
            let event = decode::<A>(id, envelope)?;
            root.apply(&event).map_err(|e| corrupt(id, e))?;
        }

        metrics::counter!("aggregate_reconstructions_total", "aggregate_type" => A::aggregate_type())
            .increment(1);
        metrics::histogram!("aggregate_replayed_events").record(replayed as f64);
        tracing::debug!(version = ?root.version(), replayed, "reconstructed aggregate");

        Ok(root.is_created().then_some(root))
    }
}

fn corrupt(aggregate_id: AggregateId, reason: impl std::fmt::Display) -> DomainError {
    DomainError::CorruptStream {
        aggregate_id,
        reason: reason.to_string(),
    }
}

/// Restored root plus the first version to replay after it.
fn restore<A: Aggregate>(
    id: AggregateId,
    snapshot: Snapshot,
) -> Result<(AggregateRoot<A>, Version), DomainError> {
    if snapshot.aggregate_id != id || snapshot.aggregate_type != A::aggregate_type() {
        return Err(corrupt(
            id,
            format!(
                "snapshot belongs to {} {}",
                snapshot.aggregate_type, snapshot.aggregate_id
            ),
        ));
    }
    let version = snapshot.version;
    let from = version
        .checked_next()
        .filter(|_| version >= Version::first())
        .ok_or_else(|| corrupt(id, format!("snapshot has invalid version {version}")))?;
    let root = AggregateRoot::from_snapshot(snapshot)
        .map_err(|e| corrupt(id, format!("snapshot at version {version}: {e}")))?;
    Ok((root, from))
}

fn decode<A: Aggregate>(id: AggregateId, envelope: EventEnvelope) -> Result<A::Event, DomainError> {
    let version = envelope.version;
    let event: A::Event = serde_json::from_value(envelope.payload)
        .map_err(|e| corrupt(id, format!("undecodable event at version {version}: {e}")))?;
    if event.version() != version {
        return Err(corrupt(
            id,
            format!(
                "event stored at version {version} carries version {}",
                event.version()
            ),
        ));
    }
    Ok(event)
}
