//! WebSocket connection abstraction

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Close code sent when a second connection takes over a station ID.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code for a slow consumer whose response queue overflowed.
pub const CLOSE_OVERLOADED: u16 = 1011;
/// Close code for framing violations.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code for binary frames.
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// Close code for liveness failures and server shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Frames queued towards a charge point. The per-connection send task
/// drains these in order, so concurrent senders never interleave bytes.
#[derive(Debug, PartialEq)]
pub enum Outbound {
    /// An OCPP text frame
    Frame(String),
    /// Transport-level keepalive ping
    Ping,
    /// Close the socket with the given code, then stop sending
    Close { code: u16, reason: &'static str },
}

/// Why a send did not go through
#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    NotConnected,
    /// Bounded queue is at the high-water mark
    QueueFull,
    /// The receiving task is gone
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => f.write_str("charge point not connected"),
            Self::QueueFull => f.write_str("outbound queue full"),
            Self::Closed => f.write_str("connection closed"),
        }
    }
}

/// An active WebSocket connection to a charge point
#[derive(Debug)]
pub struct Connection {
    pub charge_point_id: String,
    /// Registration sequence number, guards takeover races on cleanup
    pub seq: u64,
    sender: mpsc::Sender<Outbound>,
    /// Liveness flag: cleared when a ping is queued, set again on pong
    pub alive: Arc<AtomicBool>,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        charge_point_id: impl Into<String>,
        seq: u64,
        sender: mpsc::Sender<Outbound>,
        alive: Arc<AtomicBool>,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            seq,
            sender,
            alive,
            connected_at,
        }
    }

    /// Queue a frame without blocking.
    pub fn try_send(&self, outbound: Outbound) -> Result<(), SendError> {
        self.sender.try_send(outbound).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
