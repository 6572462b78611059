//! Commit dispatcher: a bounded queue of commits drained by one worker task.
//!
//! `dispatch` only enqueues, so the writer that appended the commit never
//! waits on delivery beyond queue backpressure. The worker delivers each
//! commit's events in order, one transactional send per event, and
//! broadcasts a [`DispatchReport`] per commit.
//!
//! A commit is confirmed through the [`DispatchLedger`] only after every one
//! of its events reached the transport. Until then it stays undispatched in
//! the store, so a crash or a partial delivery leads to redelivery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{
    Commit, CommitId, DispatchCommits, DispatchError, DispatchLedger, EventEnvelope, EventId,
    Handoff, Version,
};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::config::DispatcherConfig;
use crate::error::DeliveryError;
use crate::message::OutboundMessage;
use crate::transport::Transport;

const REPORT_CHANNEL_CAPACITY: usize = 256;

/// One event that did not reach the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub commit_id: CommitId,
    pub event_id: EventId,
    pub version: Version,
    pub error: DeliveryError,
}

/// Outcome of delivering one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub commit_id: CommitId,
    pub aggregate_id: AggregateId,
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delivers every event of `commit`, in commit order.
///
/// A failed or timed-out event is recorded in the report and the next event
/// is still attempted.
#[tracing::instrument(skip_all, fields(commit_id = %commit.commit_id, aggregate_id = %commit.aggregate_id))]
pub async fn deliver_commit<T: Transport + ?Sized>(
    transport: &T,
    commit: &Commit,
    send_timeout: Duration,
) -> DispatchReport {
    let mut report = DispatchReport {
        commit_id: commit.commit_id,
        aggregate_id: commit.aggregate_id,
        delivered: 0,
        failures: Vec::new(),
    };

    for envelope in &commit.events {
        match deliver_event(transport, commit, envelope, send_timeout).await {
            Ok(()) => {
                report.delivered += 1;
                metrics::counter!("dispatch_messages_delivered_total").increment(1);
            }
            Err(error) => {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    version = %envelope.version,
                    %error,
                    "event delivery failed"
                );
                metrics::counter!("dispatch_delivery_failures_total").increment(1);
                report.failures.push(DeliveryFailure {
                    commit_id: commit.commit_id,
                    event_id: envelope.event_id,
                    version: envelope.version,
                    error,
                });
            }
        }
    }

    report
}

async fn deliver_event<T: Transport + ?Sized>(
    transport: &T,
    commit: &Commit,
    envelope: &EventEnvelope,
    send_timeout: Duration,
) -> Result<(), DeliveryError> {
    let payload = OutboundMessage::from_commit_event(commit, envelope).to_bytes()?;

    let timed_out = || DeliveryError::Timeout {
        after: send_timeout,
    };
    // The channel is dropped, and so released, on every path out of here.
    let mut channel = tokio::time::timeout(send_timeout, transport.open())
        .await
        .map_err(|_| timed_out())??;
    tokio::time::timeout(send_timeout, channel.send_transactional(&payload))
        .await
        .map_err(|_| timed_out())??;

    Ok(())
}

type InFlight = Arc<Mutex<HashSet<CommitId>>>;

/// Handle for enqueueing commits. Cheap to clone.
#[derive(Clone)]
pub struct CommitDispatcher {
    queue: mpsc::Sender<Commit>,
    in_flight: InFlight,
}

impl CommitDispatcher {
    /// Starts the worker task on the current runtime.
    ///
    /// Fully delivered commits are confirmed through `ledger`, normally the
    /// store the commits were read from.
    pub fn spawn<T>(
        transport: T,
        config: DispatcherConfig,
        ledger: Arc<dyn DispatchLedger>,
    ) -> (Self, DispatchWorkerHandle)
    where
        T: Transport + 'static,
    {
        let (queue, commits) = mpsc::channel(config.queue_capacity.max(1));
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        let (stop, stop_rx) = watch::channel(false);
        let in_flight = InFlight::default();

        let worker = Worker {
            transport: Arc::new(transport),
            ledger,
            commits,
            in_flight: in_flight.clone(),
            reports: reports.clone(),
            send_timeout: config.send_timeout,
        };
        let task = tokio::spawn(worker.run(stop_rx));

        (
            Self { queue, in_flight },
            DispatchWorkerHandle {
                reports,
                stop,
                task,
            },
        )
    }
}

#[async_trait]
impl DispatchCommits for CommitDispatcher {
    /// Waits for queue space, then returns; delivery happens on the worker.
    ///
    /// A commit already queued or being delivered is not queued twice.
    async fn dispatch(&self, commit: Commit) -> Result<Handoff, DispatchError> {
        let commit_id = commit.commit_id;
        if !self.in_flight.lock().await.insert(commit_id) {
            return Ok(Handoff::Queued);
        }
        if self.queue.send(commit).await.is_err() {
            self.in_flight.lock().await.remove(&commit_id);
            return Err(DispatchError::Closed);
        }
        Ok(Handoff::Queued)
    }
}

/// Owner-side handle of the worker task.
pub struct DispatchWorkerHandle {
    reports: broadcast::Sender<DispatchReport>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatchWorkerHandle {
    /// Reports for commits delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchReport> {
        self.reports.subscribe()
    }

    /// Stops accepting commits, delivers those already queued and waits for
    /// the worker to finish.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        // The worker may already be gone; joining reports why.
        let _ = self.stop.send(true);
        self.task.await
    }
}

struct Worker<T> {
    transport: Arc<T>,
    ledger: Arc<dyn DispatchLedger>,
    commits: mpsc::Receiver<Commit>,
    in_flight: InFlight,
    reports: broadcast::Sender<DispatchReport>,
    send_timeout: Duration,
}

impl<T: Transport + 'static> Worker<T> {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!("dispatch worker started");
        loop {
            tokio::select! {
                commit = self.commits.recv() => match commit {
                    Some(commit) => self.deliver(commit).await,
                    // Every dispatcher handle was dropped.
                    None => break,
                },
                Ok(()) = stop.changed() => {
                    self.commits.close();
                    while let Some(commit) = self.commits.recv().await {
                        self.deliver(commit).await;
                    }
                    break;
                }
            }
        }
        tracing::info!("dispatch worker stopped");
    }

    async fn deliver(&self, commit: Commit) {
        let report = deliver_commit(self.transport.as_ref(), &commit, self.send_timeout).await;
        if report.is_complete() {
            match self.ledger.confirm_dispatched(report.commit_id).await {
                Ok(()) => {
                    tracing::debug!(commit_id = %report.commit_id, delivered = report.delivered, "commit delivered");
                }
                Err(error) => tracing::warn!(
                    commit_id = %report.commit_id,
                    %error,
                    "delivered commit could not be confirmed, left for redispatch"
                ),
            }
        } else {
            tracing::warn!(
                commit_id = %report.commit_id,
                failed = report.failures.len(),
                "commit partially delivered, left for redispatch"
            );
        }
        self.in_flight.lock().await.remove(&report.commit_id);
        // No subscriber is not an error.
        let _ = self.reports.send(report);
    }
}
