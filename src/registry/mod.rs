pub mod authorization;
pub mod charge_points;
pub mod store;
pub mod transactions;

pub use authorization::AuthorizationRegistry;
pub use charge_points::{BindingSource, ChargePointRegistry};
pub use store::{NullTransactionStore, TransactionStore};
pub use transactions::{StartOutcome, StopOutcome, TransactionRegistry};
