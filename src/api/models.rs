//! API request/response models for the admin surface.

use crate::ledger::types::{
    Amount, AuditRecord, DepositLimits, LedgerEntry, LockState, Wallet,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub user_id: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub initial_balance: Amount,
    #[serde(default)]
    pub deposit_limits: DepositLimits,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub currency: String,
    pub balance: Amount,
    pub lock_state: LockState,
    pub deposit_limits: DepositLimits,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_entries: Vec<LedgerEntry>,
}

impl WalletResponse {
    pub fn from_wallet(wallet: Wallet, recent_entries: Vec<LedgerEntry>) -> Self {
        Self {
            user_id: wallet.user_id,
            currency: wallet.currency,
            balance: wallet.balance,
            lock_state: wallet.lock_state,
            deposit_limits: wallet.deposit_limits,
            recent_entries,
        }
    }
}

/// Back-office balance adjustment: `deposit` and `withdrawal` carry a
/// positive magnitude, `adjustment` a signed amount.
#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    /// "deposit" | "withdrawal" | "adjustment"
    pub operation: String,
    pub amount: Amount,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub entry_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub success: bool,
    pub compensating_entry: LedgerEntry,
}

#[derive(Debug, Deserialize)]
pub struct FreezeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub wallet_id: Option<String>,
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub records: Vec<AuditRecord>,
}
