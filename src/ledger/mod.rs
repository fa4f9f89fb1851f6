//! Wallet ledger core: durable balances, append-only entries, idempotent
//! application of provider operations.
//!
//! All balance mutation funnels through [`applier::TransactionApplier`];
//! nothing else in the crate writes wallet rows.

pub mod applier;
pub mod idempotency;
pub mod store;
pub mod types;
pub mod validator;

pub use applier::{ApplyRequest, TransactionApplier};
pub use store::LedgerStore;
pub use types::*;
