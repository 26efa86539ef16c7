//! Central System → charge point commands
//!
//! Each outbound CALL is tracked until its CALLRESULT/CALLERROR arrives,
//! the deadline passes, the station disconnects, or the server shuts down.

pub mod remote_start;
pub mod remote_stop;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::session::SharedSessionRegistry;
use crate::support::clock::SharedClock;
use crate::support::ocpp_frame::OcppFrame;

pub use remote_start::remote_start_transaction;
pub use remote_stop::remote_stop_transaction;

/// Outbound-call correlation entry
struct PendingRequest {
    action: String,
    charge_point_id: String,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    waiter: oneshot::Sender<Result<Value, CommandError>>,
}

/// Failure modes of a server-initiated call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Charge point not connected: {0}")]
    NotConnected(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),

    #[error("Response deadline passed")]
    Timeout,

    #[error("Charge point disconnected while the call was pending")]
    Disconnected,

    #[error("Server shutting down")]
    Canceled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },
}

/// Sender for OCPP commands to charge points, with pending-request tracking
pub struct CommandSender {
    sessions: SharedSessionRegistry,
    pending: DashMap<(String, String), PendingRequest>,
    message_counter: AtomicU64,
    response_ttl: Duration,
    clock: SharedClock,
}

impl CommandSender {
    pub fn new(sessions: SharedSessionRegistry, response_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            sessions,
            pending: DashMap::new(),
            message_counter: AtomicU64::new(1),
            response_ttl,
            clock,
        }
    }

    /// Message IDs are a millisecond timestamp plus a process-lifetime
    /// counter, unique under concurrent outbound calls and <= 36 chars.
    fn generate_message_id(&self) -> String {
        let counter = self.message_counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.clock.now().timestamp_millis(), counter)
    }

    /// Send an OCPP CALL to a charge point and await its response payload.
    pub async fn send_command(
        &self,
        charge_point_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        let message_id = self.generate_message_id();

        let frame = OcppFrame::Call {
            message_id: message_id.clone(),
            action: action.to_string(),
            payload,
        };
        let json = frame.serialize();

        let (tx, rx) = oneshot::channel();
        let created_at = self.clock.now();

        let key = (charge_point_id.to_string(), message_id.clone());
        self.pending.insert(
            key.clone(),
            PendingRequest {
                action: action.to_string(),
                charge_point_id: charge_point_id.to_string(),
                created_at,
                deadline: created_at
                    + chrono::Duration::from_std(self.response_ttl)
                        .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                waiter: tx,
            },
        );

        info!(
            charge_point_id,
            action,
            message_id = message_id.as_str(),
            "Sending command"
        );

        if let Err(e) = self.sessions.send_server_frame(charge_point_id, json) {
            self.pending.remove(&key);
            return Err(match e {
                crate::session::SendError::NotConnected => {
                    CommandError::NotConnected(charge_point_id.to_string())
                }
                other => CommandError::SendFailed(other.to_string()),
            });
        }

        match timeout(self.response_ttl, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&key);
                Err(CommandError::InvalidResponse("Waiter channel closed".to_string()))
            }
            Err(_) => {
                self.pending.remove(&key);
                warn!(
                    charge_point_id,
                    action,
                    message_id = message_id.as_str(),
                    "Command timed out"
                );
                Err(CommandError::Timeout)
            }
        }
    }

    /// Deliver an inbound CALLRESULT to its waiter.
    pub fn handle_response(&self, charge_point_id: &str, message_id: &str, payload: Value) {
        let key = (charge_point_id.to_string(), message_id.to_string());
        if let Some((_, pending)) = self.pending.remove(&key) {
            info!(
                charge_point_id,
                action = pending.action.as_str(),
                message_id,
                pending_for_ms = (self.clock.now() - pending.created_at).num_milliseconds(),
                "Received response"
            );
            let _ = pending.waiter.send(Ok(payload));
        } else {
            warn!(charge_point_id, message_id, "Response for unknown request");
        }
    }

    /// Deliver an inbound CALLERROR to its waiter.
    pub fn handle_error(
        &self,
        charge_point_id: &str,
        message_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        let key = (charge_point_id.to_string(), message_id.to_string());
        if let Some((_, pending)) = self.pending.remove(&key) {
            warn!(
                charge_point_id,
                action = pending.action.as_str(),
                message_id,
                error_code,
                error_description,
                "Received error"
            );
            let _ = pending.waiter.send(Err(CommandError::CallError {
                code: error_code.to_string(),
                description: error_description.to_string(),
            }));
        }
    }

    /// Fail every pending request for a station with `Disconnected`.
    pub fn cancel_for_station(&self, charge_point_id: &str) {
        let keys: Vec<_> = self
            .pending
            .iter()
            .filter(|entry| entry.charge_point_id == charge_point_id)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, pending)) = self.pending.remove(&key) {
                let _ = pending.waiter.send(Err(CommandError::Disconnected));
            }
        }
    }

    /// Fail every pending request with `Canceled`. Called on shutdown.
    pub fn cancel_all(&self) {
        let keys: Vec<_> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, pending)) = self.pending.remove(&key) {
                let _ = pending.waiter.send(Err(CommandError::Canceled));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove entries whose deadline passed without a response arriving.
    /// `send_command` already enforces its own timeout; this sweeps
    /// entries whose waiter went away.
    pub fn expire_overdue(&self) {
        let now = self.clock.now();
        self.pending.retain(|_, pending| pending.deadline > now);
    }
}

pub type SharedCommandSender = Arc<CommandSender>;

pub fn create_command_sender(
    sessions: SharedSessionRegistry,
    response_ttl: Duration,
    clock: SharedClock,
) -> SharedCommandSender {
    Arc::new(CommandSender::new(sessions, response_ttl, clock))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::{Outbound, SessionRegistry};
    use crate::support::clock::system_clock;

    fn setup(ttl_ms: u64) -> (SharedSessionRegistry, SharedCommandSender, mpsc::Receiver<Outbound>) {
        let sessions = SessionRegistry::shared();
        let (tx, rx) = mpsc::channel(16);
        sessions.register("CP009", tx, Arc::new(AtomicBool::new(true)), Utc::now());
        let sender = create_command_sender(
            sessions.clone(),
            Duration::from_millis(ttl_ms),
            system_clock(),
        );
        (sessions, sender, rx)
    }

    fn sent_message_id(outbound: Outbound) -> String {
        match outbound {
            Outbound::Frame(json) => match OcppFrame::parse(&json).unwrap() {
                OcppFrame::Call { message_id, .. } => message_id,
                other => panic!("expected a Call, got {:?}", other),
            },
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn response_resolves_the_waiter() {
        let (_sessions, sender, mut rx) = setup(1000);

        let pending = {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_command("CP009", "RemoteStopTransaction", json!({"transactionId": 42}))
                    .await
            })
        };

        let message_id = sent_message_id(rx.recv().await.unwrap());
        sender.handle_response("CP009", &message_id, json!({"status": "Accepted"}));

        let result = pending.await.unwrap().unwrap();
        assert_eq!(result, json!({"status": "Accepted"}));
        assert_eq!(sender.pending_count(), 0);
    }

    #[tokio::test]
    async fn call_error_resolves_with_the_error() {
        let (_sessions, sender, mut rx) = setup(1000);

        let pending = {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_command("CP009", "RemoteStartTransaction", json!({"idTag": "X"}))
                    .await
            })
        };

        let message_id = sent_message_id(rx.recv().await.unwrap());
        sender.handle_error("CP009", &message_id, "NotSupported", "no remote start");

        match pending.await.unwrap().unwrap_err() {
            CommandError::CallError { code, .. } => assert_eq!(code, "NotSupported"),
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deadline_yields_timeout() {
        let (_sessions, sender, _rx) = setup(20);
        let result = sender
            .send_command("CP009", "RemoteStopTransaction", json!({"transactionId": 1}))
            .await;
        assert_eq!(result.unwrap_err(), CommandError::Timeout);
        assert_eq!(sender.pending_count(), 0);
    }

    #[tokio::test]
    async fn not_connected_fails_fast() {
        let (_sessions, sender, _rx) = setup(1000);
        let result = sender
            .send_command("CP404", "RemoteStopTransaction", json!({"transactionId": 1}))
            .await;
        assert!(matches!(result.unwrap_err(), CommandError::NotConnected(_)));
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_requests() {
        let (_sessions, sender, mut rx) = setup(1000);

        let pending = {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_command("CP009", "RemoteStopTransaction", json!({"transactionId": 7}))
                    .await
            })
        };

        let _ = sent_message_id(rx.recv().await.unwrap());
        sender.cancel_for_station("CP009");

        assert_eq!(pending.await.unwrap().unwrap_err(), CommandError::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_cancels_with_canceled() {
        let (_sessions, sender, mut rx) = setup(1000);

        let pending = {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_command("CP009", "RemoteStopTransaction", json!({"transactionId": 7}))
                    .await
            })
        };

        let _ = sent_message_id(rx.recv().await.unwrap());
        sender.cancel_all();

        assert_eq!(pending.await.unwrap().unwrap_err(), CommandError::Canceled);
    }

    #[tokio::test]
    async fn sweep_drops_overdue_entries() {
        use crate::support::clock::manual::ManualClock;

        let sessions = SessionRegistry::shared();
        let (tx, mut rx) = mpsc::channel(16);
        sessions.register("CP009", tx, Arc::new(AtomicBool::new(true)), Utc::now());
        let clock = Arc::new(ManualClock::fixed());
        let sender = create_command_sender(sessions, Duration::from_secs(30), clock.clone());

        let pending = {
            let sender = sender.clone();
            tokio::spawn(async move {
                sender
                    .send_command("CP009", "RemoteStopTransaction", json!({"transactionId": 9}))
                    .await
            })
        };
        let _ = sent_message_id(rx.recv().await.unwrap());
        assert_eq!(sender.pending_count(), 1);

        // Nothing is overdue yet.
        sender.expire_overdue();
        assert_eq!(sender.pending_count(), 1);

        clock.advance(chrono::Duration::seconds(31));
        sender.expire_overdue();
        assert_eq!(sender.pending_count(), 0);

        // The waiter's channel is gone; the call fails instead of hanging.
        assert!(matches!(
            pending.await.unwrap().unwrap_err(),
            CommandError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn message_ids_are_unique() {
        let (_sessions, sender, _rx) = setup(1000);
        let a = sender.generate_message_id();
        let b = sender.generate_message_id();
        assert_ne!(a, b);
        assert!(a.len() <= 36);
        assert!(b.len() <= 36);
    }
}
