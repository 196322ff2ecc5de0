//! Liveness bookkeeping for hosts that contact a server.

use intellihouse_common::HostId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Receives a signal whenever a request from a host arrives.
pub trait PresenceRegistry: Send + Sync {
    fn mark_seen(&self, host_id: &HostId);
}

/// Ignores presence signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPresence;

impl PresenceRegistry for NoPresence {
    fn mark_seen(&self, _host_id: &HostId) {}
}

#[derive(Debug, Clone, Copy)]
struct HostPresence {
    last_seen: Instant,
    online: bool,
}

/// Tracks when each host was last heard from.
///
/// A polling node contacts the coordinator at least once per poll budget, so
/// a host silent for several budgets can be considered offline. Call
/// [`sweep`](Self::sweep) periodically to flag such hosts.
#[derive(Debug, Default)]
pub struct InMemoryPresence {
    hosts: RwLock<HashMap<HostId, HostPresence>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self, host_id: &HostId) -> Option<Instant> {
        self.hosts.read().get(host_id).map(|p| p.last_seen)
    }

    pub fn is_online(&self, host_id: &HostId) -> bool {
        self.hosts.read().get(host_id).is_some_and(|p| p.online)
    }

    pub fn online_hosts(&self) -> Vec<HostId> {
        let mut hosts: Vec<HostId> = self
            .hosts
            .read()
            .iter()
            .filter(|(_, p)| p.online)
            .map(|(host, _)| host.clone())
            .collect();
        hosts.sort();
        hosts
    }

    /// Marks hosts silent for longer than `silence` as offline and returns
    /// the ones that changed state.
    pub fn sweep(&self, silence: Duration) -> Vec<HostId> {
        let now = Instant::now();
        let mut went_offline = Vec::new();
        for (host, presence) in self.hosts.write().iter_mut() {
            if presence.online && now.duration_since(presence.last_seen) > silence {
                presence.online = false;
                went_offline.push(host.clone());
            }
        }
        for host in &went_offline {
            tracing::warn!(host = %host, "Host went silent");
        }
        went_offline
    }
}

impl PresenceRegistry for InMemoryPresence {
    fn mark_seen(&self, host_id: &HostId) {
        let previous = self.hosts.write().insert(
            host_id.clone(),
            HostPresence {
                last_seen: Instant::now(),
                online: true,
            },
        );
        if !previous.is_some_and(|p| p.online) {
            tracing::info!(host = %host_id, "Host is online");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mark_seen() {
        let presence = InMemoryPresence::new();
        let host = HostId::new("pi-garage");
        assert!(!presence.is_online(&host));

        presence.mark_seen(&host);
        assert!(presence.is_online(&host));
        assert!(presence.last_seen(&host).is_some());
        assert_eq!(presence.online_hosts(), vec![host]);
    }

    #[test]
    fn test_sweep_flags_silent_hosts_once() {
        let presence = InMemoryPresence::new();
        let quiet = HostId::new("quiet");
        let chatty = HostId::new("chatty");
        presence.mark_seen(&quiet);
        thread::sleep(Duration::from_millis(60));
        presence.mark_seen(&chatty);

        assert_eq!(presence.sweep(Duration::from_millis(30)), vec![quiet.clone()]);
        assert!(presence.sweep(Duration::from_millis(30)).is_empty());
        assert!(!presence.is_online(&quiet));
        assert!(presence.is_online(&chatty));

        presence.mark_seen(&quiet);
        assert!(presence.is_online(&quiet));
    }
}
