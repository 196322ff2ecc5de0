use intellihouse_common::{HostId, RequestEnvelope};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct HostQueue {
    requests: Mutex<VecDeque<RequestEnvelope>>,
    available: Condvar,
}

/// Per-host FIFO queues of requests waiting to be collected by a poll.
///
/// A request is handed out by exactly one poll: draining happens under the
/// queue lock, so concurrent pollers for the same host never see the same
/// request twice.
#[derive(Default)]
pub struct InverseRequestRegistry {
    queues: Mutex<HashMap<HostId, Arc<HostQueue>>>,
    closed: AtomicBool,
}

impl InverseRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, host_id: &HostId) -> Arc<HostQueue> {
        self.queues
            .lock()
            .entry(host_id.clone())
            .or_default()
            .clone()
    }

    /// Appends `request` to the queue of `host_id` and wakes its pollers.
    pub fn enqueue(&self, host_id: &HostId, request: RequestEnvelope) {
        let queue = self.queue(host_id);
        queue.requests.lock().push_back(request);
        queue.available.notify_all();
        tracing::debug!(host = %host_id, "Queued inverse request");
    }

    /// Blocks until requests for `host_id` are queued or `timeout` elapses,
    /// then drains and returns everything queued, oldest first.
    ///
    /// Returns an empty batch no earlier than `timeout` unless the registry
    /// is closed meanwhile.
    pub fn poll_requests(&self, host_id: &HostId, timeout: Duration) -> Vec<RequestEnvelope> {
        let queue = self.queue(host_id);
        let deadline = Instant::now() + timeout;

        let mut requests = queue.requests.lock();
        while requests.is_empty() && !self.closed.load(Ordering::Acquire) {
            if queue.available.wait_until(&mut requests, deadline).timed_out() {
                break;
            }
        }
        requests.drain(..).collect()
    }

    /// Number of requests waiting for `host_id`.
    pub fn pending_count(&self, host_id: &HostId) -> usize {
        self.queues
            .lock()
            .get(host_id)
            .map_or(0, |queue| queue.requests.lock().len())
    }

    /// Releases every blocked poller with whatever its queue holds.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let queues: Vec<Arc<HostQueue>> = self.queues.lock().values().cloned().collect();
        for queue in queues {
            let _guard = queue.requests.lock();
            queue.available.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intellihouse_common::{RequestHeader, RequestId};
    use serde_json::json;
    use std::thread;

    fn envelope(n: u64) -> RequestEnvelope {
        let mut header = RequestHeader::new(HostId::new("pi"));
        header.request_id = Some(RequestId::generate());
        RequestEnvelope {
            header,
            request_type: "Echo".to_string(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn test_poll_returns_fifo_batch() {
        let registry = InverseRequestRegistry::new();
        let host = HostId::new("pi");
        for n in 0..3 {
            registry.enqueue(&host, envelope(n));
        }

        let batch = registry.poll_requests(&host, Duration::from_millis(10));
        let order: Vec<u64> = batch.iter().map(|r| r.payload["n"].as_u64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(registry.pending_count(&host), 0);
    }

    #[test]
    fn test_empty_poll_waits_full_timeout() {
        let registry = InverseRequestRegistry::new();
        let start = Instant::now();

        let batch = registry.poll_requests(&HostId::new("pi"), Duration::from_millis(100));

        assert!(batch.is_empty());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[test]
    fn test_enqueue_wakes_waiting_poller() {
        let registry = Arc::new(InverseRequestRegistry::new());
        let host = HostId::new("pi");

        let poller = {
            let registry = registry.clone();
            let host = host.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (registry.poll_requests(&host, Duration::from_secs(10)), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        registry.enqueue(&host, envelope(7));

        let (batch, waited) = poller.join().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn test_queues_are_per_host() {
        let registry = InverseRequestRegistry::new();
        registry.enqueue(&HostId::new("pi-1"), envelope(1));

        assert!(registry
            .poll_requests(&HostId::new("pi-2"), Duration::from_millis(10))
            .is_empty());
        assert_eq!(registry.pending_count(&HostId::new("pi-1")), 1);
    }

    #[test]
    fn test_concurrent_pollers_never_share_a_request() {
        let registry = Arc::new(InverseRequestRegistry::new());
        let host = HostId::new("pi");

        let pollers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let host = host.clone();
                thread::spawn(move || registry.poll_requests(&host, Duration::from_millis(300)))
            })
            .collect();
        for n in 0..20 {
            registry.enqueue(&host, envelope(n));
        }

        let mut seen: Vec<u64> = pollers
            .into_iter()
            .flat_map(|p| p.join().unwrap())
            .map(|r| r.payload["n"].as_u64().unwrap())
            .collect();
        seen.extend(
            registry
                .poll_requests(&host, Duration::from_millis(10))
                .iter()
                .map(|r| r.payload["n"].as_u64().unwrap()),
        );
        seen.sort();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_close_releases_pollers() {
        let registry = Arc::new(InverseRequestRegistry::new());
        let poller = {
            let registry = registry.clone();
            thread::spawn(move || {
                let start = Instant::now();
                registry.poll_requests(&HostId::new("pi"), Duration::from_secs(30));
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(50));
        registry.close();

        assert!(poller.join().unwrap() < Duration::from_secs(5));
    }
}
