//! Outbound transport abstraction and an in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TransportError;

/// A queue that accepts messages inside its own unit of work.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a sending channel. Dropping the channel releases it.
    async fn open(&self) -> Result<Box<dyn Channel>, TransportError>;
}

/// A scoped sending channel.
#[async_trait]
pub trait Channel: Send {
    /// Enqueues `payload` in a transaction of its own. The message is visible
    /// to consumers only if this returns `Ok`.
    async fn send_transactional(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn open(&self) -> Result<Box<dyn Channel>, TransportError> {
        (**self).open().await
    }
}

#[derive(Default)]
struct Shared {
    committed: Mutex<Vec<Vec<u8>>>,
    fail_sends: Mutex<HashSet<usize>>,
    stall_sends: Mutex<HashSet<usize>>,
    fail_opens: Mutex<HashSet<usize>>,
    sends: AtomicUsize,
    opens: AtomicUsize,
    open_channels: AtomicUsize,
}

/// In-memory transport for tests and embedding.
///
/// A send is staged on its channel and moved to the shared queue only when
/// its transaction commits. Individual sends (counted from 1 across all
/// channels) can be made to fail or to never complete.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `nth` send attempt fail.
    pub async fn fail_send(&self, nth: usize) {
        self.shared.fail_sends.lock().await.insert(nth);
    }

    /// Makes the `nth` send attempt hang forever.
    pub async fn stall_send(&self, nth: usize) {
        self.shared.stall_sends.lock().await.insert(nth);
    }

    /// Makes the `nth` channel open fail.
    pub async fn fail_open(&self, nth: usize) {
        self.shared.fail_opens.lock().await.insert(nth);
    }

    /// Payloads whose transaction committed, in commit order.
    pub async fn committed(&self) -> Vec<Vec<u8>> {
        self.shared.committed.lock().await.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.shared.sends.load(Ordering::SeqCst)
    }

    /// Channels opened and not yet dropped.
    pub fn open_channels(&self) -> usize {
        self.shared.open_channels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self) -> Result<Box<dyn Channel>, TransportError> {
        let nth = self.shared.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shared.fail_opens.lock().await.contains(&nth) {
            return Err(TransportError::Unavailable(format!("open #{nth} refused")));
        }

        self.shared.open_channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryChannel {
            shared: self.shared.clone(),
            staged: Vec::new(),
        }))
    }
}

struct InMemoryChannel {
    shared: Arc<Shared>,
    staged: Vec<Vec<u8>>,
}

#[async_trait]
impl Channel for InMemoryChannel {
    async fn send_transactional(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let nth = self.shared.sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.staged.push(payload.to_vec());

        if self.shared.stall_sends.lock().await.contains(&nth) {
            std::future::pending::<()>().await;
        }
        if self.shared.fail_sends.lock().await.contains(&nth) {
            // Rolled back: nothing staged becomes visible.
            self.staged.clear();
            return Err(TransportError::Rejected(format!("send #{nth} rolled back")));
        }

        self.shared.committed.lock().await.append(&mut self.staged);
        Ok(())
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.shared.open_channels.fetch_sub(1, Ordering::SeqCst);
    }
}
