//! Table of invocations waiting for a response that arrives out of band.

use intellihouse_common::{RequestId, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Waiters keyed by request id.
///
/// A registered waiter is completed at most once; a response that finds no
/// waiter (the caller already timed out) is reported back as unmatched so the
/// caller can log and drop it.
#[derive(Default)]
pub struct PendingResponses {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `request_id`, replacing any previous one.
    pub fn register(&self, request_id: RequestId) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        if self.waiters.lock().insert(request_id, tx).is_some() {
            tracing::debug!(%request_id, "Replaced existing waiter");
        }
        rx
    }

    /// Hands `response` to its waiter. Returns `false` when nobody is waiting.
    pub fn complete(&self, response: Response) -> bool {
        let waiter = self.waiters.lock().remove(&response.request_id);
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Forgets the waiter for `request_id`, if any.
    pub fn cancel(&self, request_id: &RequestId) {
        self.waiters.lock().remove(request_id);
    }

    /// Drops every waiter; their receivers observe a closed channel.
    pub fn clear(&self) {
        self.waiters.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}
