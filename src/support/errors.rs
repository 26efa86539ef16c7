use thiserror::Error;

/// Failures surfaced by the transaction registry.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Transaction {0} not found")]
    TransactionNotFound(i32),

    #[error("Transaction ID space exhausted")]
    TransactionIdExhausted,
}

pub type DomainResult<T> = Result<T, DomainError>;
