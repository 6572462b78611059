//! Redelivery loop for commits whose hand-off never completed.

use std::future::Future;
use std::time::Duration;

use event_store::{DispatchingEventStore, EventStore};
use tokio::time::MissedTickBehavior;

use crate::error::Result;

/// Periodically re-hands undispatched commits to the dispatcher.
///
/// Covers commits left pending by a crash between append and hand-off, or by
/// a dispatcher that refused them. Redelivery is at-least-once.
pub struct Relay<S> {
    store: DispatchingEventStore<S>,
    poll_interval: Duration,
}

impl<S: EventStore> Relay<S> {
    pub fn new(store: DispatchingEventStore<S>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    pub fn store(&self) -> &DispatchingEventStore<S> {
        &self.store
    }

    /// One redelivery pass. Returns how many commits were accepted.
    pub async fn run_once(&self) -> Result<usize> {
        let accepted = self.store.redispatch_pending().await?;
        metrics::counter!("relay_commits_redispatched_total").increment(accepted as u64);
        Ok(accepted)
    }

    /// Runs passes every `poll_interval`, starting immediately, until
    /// `shutdown` completes. A failed pass is logged and retried on the next
    /// tick.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "relay started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        tracing::warn!(%error, "redelivery pass failed");
                        metrics::counter!("relay_pass_failures_total").increment(1);
                    }
                }
            }
        }
        tracing::info!("relay stopped");
    }
}
