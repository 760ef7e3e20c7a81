use super::user_point_repository::StoreError;
use crate::application::key_lock::LockError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PointError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Balance would exceed limit: {current} + {amount} > {max}")]
    BalanceExceeded { current: i64, amount: i64, max: i64 },

    #[error("Insufficient balance: {current} < {amount}")]
    InsufficientBalance { current: i64, amount: i64 },

    #[error("Concurrency error: {0}")]
    Concurrency(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PointError {
    // Можно повторить запрос позже, состояние не менялось
    pub fn is_retryable(&self) -> bool {
        matches!(self, PointError::Concurrency(LockError::Timeout { .. }))
    }
}
