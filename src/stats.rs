use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Statistics snapshot for one relay service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Service name
    pub name: String,
    /// Total number of sessions
    pub total_sessions: u64,
    /// Currently active sessions
    pub active_sessions: u64,
    /// Total bytes relayed from bridge to peer
    pub bytes_bridge_to_peer: u64,
    /// Total bytes relayed from peer to bridge
    pub bytes_peer_to_bridge: u64,
    /// Timestamp when this tracker was created (Unix timestamp)
    pub start_time: u64,
}

/// Statistics tracker shared by every session of a service
#[derive(Debug, Clone)]
pub struct RelayStatsTracker {
    name: String,
    total_sessions: Arc<AtomicU64>,
    active_sessions: Arc<AtomicU64>,
    bytes_bridge_to_peer: Arc<AtomicU64>,
    bytes_peer_to_bridge: Arc<AtomicU64>,
    start_time: u64,
}

impl RelayStatsTracker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_sessions: Arc::new(AtomicU64::new(0)),
            active_sessions: Arc::new(AtomicU64::new(0)),
            bytes_bridge_to_peer: Arc::new(AtomicU64::new(0)),
            bytes_peer_to_bridge: Arc::new(AtomicU64::new(0)),
            start_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Increment active sessions (called when a session starts)
    pub fn session_started(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active sessions (called when a session ends)
    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a finished session's byte counts
    pub fn add_bytes(&self, bridge_to_peer: u64, peer_to_bridge: u64) {
        self.bytes_bridge_to_peer
            .fetch_add(bridge_to_peer, Ordering::Relaxed);
        self.bytes_peer_to_bridge
            .fetch_add(peer_to_bridge, Ordering::Relaxed);
    }

    /// Get current snapshot of stats
    pub fn get_stats(&self) -> RelayStats {
        RelayStats {
            name: self.name.clone(),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            bytes_bridge_to_peer: self.bytes_bridge_to_peer.load(Ordering::Relaxed),
            bytes_peer_to_bridge: self.bytes_peer_to_bridge.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }

    /// Snapshot as a JSON string, for log lines
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.get_stats()).unwrap_or_default()
    }
}

/// RAII guard that marks a session active for its lifetime
pub struct SessionGuard {
    tracker: RelayStatsTracker,
}

impl SessionGuard {
    pub fn new(tracker: RelayStatsTracker) -> Self {
        tracker.session_started();
        Self { tracker }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.session_ended();
    }
}
