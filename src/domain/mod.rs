pub mod charge_point;
pub mod id_tag;
pub mod transaction;

pub use charge_point::{ChargePoint, ConnectorState, ConnectorStatus, MeterReading, MeterSnapshot};
pub use id_tag::{IdTag, IdTagInfo, IdTagStatus};
pub use transaction::{MeterSample, Transaction, TransactionStatus};
