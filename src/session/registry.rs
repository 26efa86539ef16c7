//! Session registry — active charge point connections indexed by station ID

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::connection::{Connection, Outbound, SendError, CLOSE_POLICY_VIOLATION};

/// Outcome of registering a connection
#[derive(Debug)]
pub struct RegisterOutcome {
    /// Sequence token to pass back to [`SessionRegistry::unregister_if`]
    pub seq: u64,
    /// A previous connection for the same station was taken over
    pub evicted: bool,
}

/// Thread-safe registry of active OCPP sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    next_seq: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a connection for a station.
    ///
    /// Takeover policy: a second connection for an already-connected
    /// station wins. The existing connection is told to close with 1008
    /// and its sender is dropped.
    pub fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::Sender<Outbound>,
        alive: Arc<AtomicBool>,
        connected_at: DateTime<Utc>,
    ) -> RegisterOutcome {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        let evicted = self
            .sessions
            .remove(charge_point_id)
            .map(|(_, old)| {
                warn!(
                    charge_point_id,
                    connected_since = %old.connected_at,
                    "Takeover: closing previous connection"
                );
                let _ = old.try_send(Outbound::Close {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "policy violation: superseded by a new connection",
                });
            })
            .is_some();

        info!(charge_point_id, seq, "Registering charge point session");
        self.sessions.insert(
            charge_point_id.to_string(),
            Connection::new(charge_point_id, seq, sender, alive, connected_at),
        );

        metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);

        RegisterOutcome { seq, evicted }
    }

    /// Remove the session only if it still belongs to the caller's
    /// registration. Returns whether an entry was removed, so an evicted
    /// connection's cleanup cannot tear down its successor.
    pub fn unregister_if(&self, charge_point_id: &str, seq: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, conn| conn.seq == seq)
            .is_some();
        if removed {
            metrics::gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
            info!(charge_point_id, "Unregistered charge point session");
        }
        removed
    }

    /// Queue a server-initiated frame. On a full queue the frame is
    /// dropped and the caller gets the error; the connection stays up.
    pub fn send_server_frame(&self, charge_point_id: &str, frame: String) -> Result<(), SendError> {
        match self.sessions.get(charge_point_id) {
            Some(conn) => {
                let result = conn.try_send(Outbound::Frame(frame));
                if result == Err(SendError::QueueFull) {
                    warn!(charge_point_id, "Outbound queue full, dropping server-initiated frame");
                }
                result
            }
            None => Err(SendError::NotConnected),
        }
    }

    /// Ask a connection to close.
    pub fn request_close(&self, charge_point_id: &str, code: u16, reason: &'static str) {
        if let Some(conn) = self.sessions.get(charge_point_id) {
            let _ = conn.try_send(Outbound::Close { code, reason });
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(capacity: usize) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(capacity)
    }

    fn register(
        registry: &SessionRegistry,
        id: &str,
        capacity: usize,
    ) -> (RegisterOutcome, mpsc::Receiver<Outbound>) {
        let (tx, rx) = channel(capacity);
        let outcome = registry.register(id, tx, Arc::new(AtomicBool::new(true)), Utc::now());
        (outcome, rx)
    }

    #[tokio::test]
    async fn takeover_closes_the_old_connection_with_1008() {
        let registry = SessionRegistry::new();
        let (first, mut old_rx) = register(&registry, "CP001", 8);
        let (second, _new_rx) = register(&registry, "CP001", 8);

        assert!(!first.evicted);
        assert!(second.evicted);
        assert_ne!(first.seq, second.seq);

        match old_rx.recv().await.unwrap() {
            Outbound::Close { code, .. } => assert_eq!(code, CLOSE_POLICY_VIOLATION),
            other => panic!("expected close, got {:?}", other),
        }
        // Old sender was dropped with the eviction.
        assert!(old_rx.recv().await.is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn evicted_cleanup_cannot_remove_the_successor() {
        let registry = SessionRegistry::new();
        let (first, _rx1) = register(&registry, "CP001", 8);
        let (second, _rx2) = register(&registry, "CP001", 8);

        // The evicted task's cleanup runs late and must be a no-op.
        assert!(!registry.unregister_if("CP001", first.seq));
        assert!(registry.is_connected("CP001"));

        assert!(registry.unregister_if("CP001", second.seq));
        assert!(!registry.is_connected("CP001"));
    }

    #[test]
    fn send_to_unknown_station_fails() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.send_server_frame("ghost", "[]".to_string()),
            Err(SendError::NotConnected)
        );
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let registry = SessionRegistry::new();
        let (_outcome, mut rx) = register(&registry, "CP001", 1);

        assert!(registry.send_server_frame("CP001", "one".to_string()).is_ok());
        assert_eq!(
            registry.send_server_frame("CP001", "two".to_string()),
            Err(SendError::QueueFull)
        );

        // Drain one slot and sending works again.
        assert_eq!(rx.recv().await, Some(Outbound::Frame("one".to_string())));
        assert!(registry.send_server_frame("CP001", "four".to_string()).is_ok());
    }
}
