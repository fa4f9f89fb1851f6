//! Core wallet and ledger record types.
//!
//! Monetary amounts are integers in minor units (cents) everywhere. Ledger
//! entry amounts are the signed effect on the balance: bets and withdrawals
//! are negative, wins and deposits positive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in minor units
pub type Amount = i64;

/// Wallet lock state. Frozen wallets reject all player-initiated debits and
/// credits; admin rollbacks still apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Active,
    Frozen,
}

/// Per-window deposit caps in minor units. A missing cap means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositLimits {
    #[serde(default)]
    pub daily: Option<Amount>,
    #[serde(default)]
    pub weekly: Option<Amount>,
    #[serde(default)]
    pub monthly: Option<Amount>,
}

/// The limit window that rejected a deposit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitWindow {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitWindow::Daily => write!(f, "daily"),
            LimitWindow::Weekly => write!(f, "weekly"),
            LimitWindow::Monthly => write!(f, "monthly"),
        }
    }
}

/// A player wallet. One wallet per user; the user id doubles as the wallet
/// key. `balance >= 0` holds at all times — the store refuses any write
/// that would break it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub currency: String,
    pub balance: Amount,
    pub lock_state: LockState,
    #[serde(default)]
    pub deposit_limits: DepositLimits,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Wallet {
    pub fn is_frozen(&self) -> bool {
        self.lock_state == LockState::Frozen
    }
}

/// Ledger operation type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Bet,
    Win,
    Rollback,
    Deposit,
    Withdrawal,
    Adjustment,
}

impl OperationType {
    /// Sign of the balance effect for a positive input magnitude
    pub fn is_debit(&self) -> bool {
        matches!(self, OperationType::Bet | OperationType::Withdrawal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Bet => "bet",
            OperationType::Win => "win",
            OperationType::Rollback => "rollback",
            OperationType::Deposit => "deposit",
            OperationType::Withdrawal => "withdrawal",
            OperationType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Composite idempotency key: one per (provider, round, operation type).
/// Correctness of deduplication rests entirely on providers supplying
/// stable round ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationKey {
    pub provider: String,
    pub round_id: String,
    pub op: OperationType,
}

impl OperationKey {
    pub fn new(provider: &str, round_id: &str, op: OperationType) -> Self {
        Self {
            provider: provider.to_string(),
            round_id: round_id.to_string(),
            op,
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.round_id, self.op)
    }
}

/// Entry lifecycle status. Entries are immutable once `completed`; the only
/// permitted transition is `completed -> rolled_back`, performed together
/// with the compensating entry in one atomic batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Failed,
    RolledBack,
}

/// One row of the append-only transaction log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub wallet_id: String,
    /// Idempotency key of the producing operation; synthetic
    /// (`rollback:<original-id>`) for compensating entries
    pub operation_key: String,
    #[serde(rename = "type")]
    pub entry_type: OperationType,
    /// Signed effect on the balance
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: EntryStatus,
    /// Id of the compensating rollback entry, once rolled back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_by: Option<String>,
    /// For rollback entries, the id of the original entry being compensated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,
    pub created_at: i64,
}

/// Internal result of processing one callback, cached for duplicate replay
/// and translated into the provider wire shape by the response adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub success: bool,
    pub balance: Amount,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CallbackResult {
    pub fn ok(balance: Amount, currency: &str) -> Self {
        Self {
            success: true,
            balance,
            currency: currency.to_string(),
            error_code: None,
        }
    }

    pub fn rejected(code: &str, balance: Amount, currency: &str) -> Self {
        Self {
            success: false,
            balance,
            currency: currency.to_string(),
            error_code: Some(code.to_string()),
        }
    }
}

/// Idempotency record lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InFlight,
    Completed,
}

/// Persisted idempotency record. Created as a placeholder before any
/// mutation, finalized with the cached result, expired after the retention
/// window to bound storage growth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub operation_key: String,
    pub status: IdempotencyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CallbackResult>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Administrative actions that produce an audit trail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RollbackTransaction,
    FreezeWallet,
    UnfreezeWallet,
    AdjustBalance,
    CreateWallet,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RollbackTransaction => "rollback_transaction",
            AuditAction::FreezeWallet => "freeze_wallet",
            AuditAction::UnfreezeWallet => "unfreeze_wallet",
            AuditAction::AdjustBalance => "adjust_balance",
            AuditAction::CreateWallet => "create_wallet",
        }
    }
}

/// Admin-visible audit record. References ledger entries and wallets but
/// never mutates them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    /// Admin user id, or "system" for provider-initiated compensations
    pub actor: String,
    pub action: AuditAction,
    pub wallet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    pub reason: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub created_at: i64,
}
