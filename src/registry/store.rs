//! Persistence plug-in point
//!
//! Without a store the process is stateless across restarts. A store must
//! at least persist the transaction counter and completed transactions;
//! live station state is re-learned from the next boot/status notifications.

use async_trait::async_trait;

use crate::domain::Transaction;

/// Hook for durable transaction storage.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Seed for the transaction ID counter, `max(persisted id) + 1`.
    /// `None` starts the counter at 1.
    async fn load_counter(&self) -> Option<i32>;

    /// Called exactly once per transaction transition to Completed.
    async fn transaction_completed(&self, transaction: &Transaction);
}

/// Default store: keeps nothing.
pub struct NullTransactionStore;

#[async_trait]
impl TransactionStore for NullTransactionStore {
    async fn load_counter(&self) -> Option<i32> {
        None
    }

    async fn transaction_completed(&self, _transaction: &Transaction) {}
}
