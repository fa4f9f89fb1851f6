//! Error types for wallet transaction processing
//!
//! Business-rule failures are ordinary values here, not panics: they travel
//! up to the provider response adapter and come out as provider-shaped
//! failure bodies with HTTP 200. Only parsing failures and unexpected
//! internal faults ever become HTTP error statuses.

use crate::ledger::types::LimitWindow;

/// Root error type for all wallet operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Wallet not found for user {0}")]
    WalletNotFound(String),

    #[error("Wallet for user {0} already exists")]
    WalletAlreadyExists(String),

    #[error("Wallet for user {0} is frozen")]
    WalletFrozen(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Deposit limit exceeded for {0} window")]
    LimitExceeded(LimitWindow),

    #[error("Concurrent modification of wallet {0}")]
    ConcurrencyConflict(String),

    #[error("Ledger entry {0} not found")]
    EntryNotFound(String),

    #[error("Ledger entry {0} has already been rolled back")]
    AlreadyRolledBack(String),

    #[error("Operation {0} is still being processed")]
    OperationInFlight(String),

    #[error("Invalid amount {amount} for {operation} operation")]
    InvalidAmount { operation: String, amount: i64 },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Corrupted record: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for WalletError {
    fn from(e: rocksdb::Error) -> Self {
        WalletError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::CorruptedData(e.to_string())
    }
}

impl WalletError {
    /// Short machine-readable code rendered into provider failure bodies.
    /// Internal fault detail never crosses this boundary.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::WalletNotFound(_) => "UNKNOWN_PLAYER",
            WalletError::WalletAlreadyExists(_) => "WALLET_EXISTS",
            WalletError::WalletFrozen(_) => "WALLET_FROZEN",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::LimitExceeded(LimitWindow::Daily) => "DAILY_LIMIT_EXCEEDED",
            WalletError::LimitExceeded(LimitWindow::Weekly) => "WEEKLY_LIMIT_EXCEEDED",
            WalletError::LimitExceeded(LimitWindow::Monthly) => "MONTHLY_LIMIT_EXCEEDED",
            WalletError::ConcurrencyConflict(_) => "INTERNAL_ERROR",
            WalletError::EntryNotFound(_) => "TRANSACTION_NOT_FOUND",
            WalletError::AlreadyRolledBack(_) => "ALREADY_ROLLED_BACK",
            WalletError::OperationInFlight(_) => "RETRY_LATER",
            WalletError::InvalidAmount { .. } => "INVALID_AMOUNT",
            WalletError::Storage(_) | WalletError::CorruptedData(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is a business-rule rejection the provider should
    /// see as a normal (HTTP 200) failure outcome, as opposed to an
    /// internal fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            WalletError::ConcurrencyConflict(_)
                | WalletError::Storage(_)
                | WalletError::CorruptedData(_)
        )
    }
}

/// Convenience alias used throughout the ledger modules
pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_short_and_stable() {
        let e = WalletError::InsufficientBalance {
            available: 10,
            requested: 60,
        };
        assert_eq!(e.code(), "INSUFFICIENT_BALANCE");
        assert!(e.is_rejection());

        let e = WalletError::Storage("rocksdb: io error".to_string());
        assert_eq!(e.code(), "INTERNAL_ERROR");
        assert!(!e.is_rejection());
    }

    #[test]
    fn test_limit_window_codes() {
        assert_eq!(
            WalletError::LimitExceeded(LimitWindow::Weekly).code(),
            "WEEKLY_LIMIT_EXCEEDED"
        );
    }
}
