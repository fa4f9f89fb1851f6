//! Pre-mutation business-rule checks.
//!
//! Pure functions over a wallet snapshot and precomputed ledger sums — no
//! store access here, so every rule is testable in isolation. The store
//! enforces the non-negative-balance invariant a second time at commit; the
//! validator exists to reject bad operations before any write is attempted.

use crate::errors::{WalletError, WalletResult};
use crate::ledger::types::{Amount, LimitWindow, OperationType, Wallet};
use serde::{Deserialize, Serialize};

/// Sums of completed `deposit` entries in each rolling limit window,
/// computed by the ledger store immediately before validation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DepositWindowTotals {
    pub daily: Amount,
    pub weekly: Amount,
    pub monthly: Amount,
}

/// Reject a debit of `amount` (positive magnitude) against the wallet.
/// Frozen wallets reject everything; active wallets reject overdrafts.
pub fn validate_debit(wallet: &Wallet, amount: Amount) -> WalletResult<()> {
    if wallet.is_frozen() {
        return Err(WalletError::WalletFrozen(wallet.user_id.clone()));
    }
    if wallet.balance < amount {
        return Err(WalletError::InsufficientBalance {
            available: wallet.balance,
            requested: amount,
        });
    }
    Ok(())
}

/// Reject a credit of `amount` (positive magnitude) against the wallet.
/// Deposit limits apply to `deposit` operations only — wins and rollbacks
/// are not player-initiated deposits and bypass them.
pub fn validate_credit(
    wallet: &Wallet,
    amount: Amount,
    op: OperationType,
    totals: &DepositWindowTotals,
) -> WalletResult<()> {
    if wallet.is_frozen() && op != OperationType::Rollback {
        return Err(WalletError::WalletFrozen(wallet.user_id.clone()));
    }

    if op == OperationType::Deposit {
        let limits = &wallet.deposit_limits;
        if let Some(cap) = limits.daily {
            if totals.daily + amount > cap {
                return Err(WalletError::LimitExceeded(LimitWindow::Daily));
            }
        }
        if let Some(cap) = limits.weekly {
            if totals.weekly + amount > cap {
                return Err(WalletError::LimitExceeded(LimitWindow::Weekly));
            }
        }
        if let Some(cap) = limits.monthly {
            if totals.monthly + amount > cap {
                return Err(WalletError::LimitExceeded(LimitWindow::Monthly));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{DepositLimits, LockState};

    fn wallet(balance: Amount) -> Wallet {
        Wallet {
            user_id: "u-1".to_string(),
            currency: "EUR".to_string(),
            balance,
            lock_state: LockState::Active,
            deposit_limits: DepositLimits::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_debit_rejects_overdraft() {
        let w = wallet(5000);
        assert!(validate_debit(&w, 5000).is_ok());
        let err = validate_debit(&w, 5001).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_frozen_wallet_rejects_debit_and_credit() {
        let mut w = wallet(10_000);
        w.lock_state = LockState::Frozen;

        assert!(matches!(
            validate_debit(&w, 100).unwrap_err(),
            WalletError::WalletFrozen(_)
        ));
        assert!(matches!(
            validate_credit(&w, 100, OperationType::Win, &DepositWindowTotals::default())
                .unwrap_err(),
            WalletError::WalletFrozen(_)
        ));
        // Compensations still land on frozen wallets
        assert!(validate_credit(
            &w,
            100,
            OperationType::Rollback,
            &DepositWindowTotals::default()
        )
        .is_ok());
    }

    #[test]
    fn test_deposit_limits_per_window() {
        let mut w = wallet(0);
        w.deposit_limits = DepositLimits {
            daily: Some(10_000),
            weekly: Some(50_000),
            monthly: None,
        };
        let totals = DepositWindowTotals {
            daily: 9_000,
            weekly: 20_000,
            monthly: 20_000,
        };

        assert!(validate_credit(&w, 1_000, OperationType::Deposit, &totals).is_ok());
        assert!(matches!(
            validate_credit(&w, 1_001, OperationType::Deposit, &totals).unwrap_err(),
            WalletError::LimitExceeded(LimitWindow::Daily)
        ));

        let weekly_heavy = DepositWindowTotals {
            daily: 0,
            weekly: 49_500,
            monthly: 49_500,
        };
        assert!(matches!(
            validate_credit(&w, 1_000, OperationType::Deposit, &weekly_heavy).unwrap_err(),
            WalletError::LimitExceeded(LimitWindow::Weekly)
        ));
    }

    #[test]
    fn test_wins_bypass_deposit_limits() {
        let mut w = wallet(0);
        w.deposit_limits = DepositLimits {
            daily: Some(100),
            weekly: Some(100),
            monthly: Some(100),
        };
        let totals = DepositWindowTotals {
            daily: 100,
            weekly: 100,
            monthly: 100,
        };
        assert!(validate_credit(&w, 1_000_000, OperationType::Win, &totals).is_ok());
    }

}
