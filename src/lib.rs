//! walletiq - Seamless Wallet Transaction Processor
//!
//! Receives bet/win/rollback/balance callbacks from casino game providers
//! and applies them to player wallets with strict consistency, idempotency,
//! and auditability guarantees.
//!
//! Control flow: callback router parses provider and payload, the
//! idempotency guard deduplicates retried deliveries, the validator checks
//! wallet state and limits, the applier mutates balance and appends the
//! ledger entry in one atomic unit, and the provider response adapter
//! renders the result in the provider's wire shape.
//!
//! Concurrent callbacks against the same wallet are serialized at the data
//! layer: an optimistic compare against the caller's balance snapshot
//! inside the store, with bounded retry in the applier. No cross-request
//! in-process state is authoritative — wallet rows in storage are.

pub mod api;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod providers;
pub mod storage;

pub use errors::{WalletError, WalletResult};
pub use ledger::applier::{ApplyRequest, TransactionApplier};
pub use ledger::idempotency::IdempotencyGuard;
pub use ledger::store::LedgerStore;
pub use ledger::types::{
    Amount, CallbackResult, EntryStatus, LedgerEntry, LockState, OperationKey, OperationType,
    Wallet,
};
pub use providers::{ProviderFamily, ProviderRegistry};
pub use storage::Storage;
