pub mod connection;
pub mod registry;

pub use connection::{Connection, Outbound, SendError};
pub use registry::{RegisterOutcome, SessionRegistry, SharedSessionRegistry};
