//! # Voltmesh CSMS
//!
//! OCPP 1.6J Central System for managing EV charging stations.
//!
//! ## Architecture
//!
//! - **support**: Cross-cutting utilities (clock, errors, frame codec, shutdown)
//! - **domain**: Core entities and value objects (stations, transactions, ID tags)
//! - **registry**: Authoritative live state (authorization, charge points, transactions)
//! - **ocpp**: Schema validation and per-action message handling
//! - **session**: Active charge-point connections and their send queues
//! - **commands**: Central-System-initiated calls and pending-request tracking
//! - **events**: Delta-event bus feeding dashboard subscribers
//! - **interfaces**: Delivery mechanisms (OCPP WebSocket, REST, dashboard WebSocket)
//! - **config**: Application configuration (TOML-based)

pub mod commands;
pub mod config;
pub mod domain;
pub mod events;
pub mod interfaces;
pub mod ocpp;
pub mod registry;
pub mod session;
pub mod support;

// Re-export commonly used types at crate root
pub use config::{default_config_path, AppConfig};
pub use events::{create_event_bus, Event, EventBus, SharedEventBus};
pub use support::clock::{system_clock, Clock, SharedClock, SystemClock};
