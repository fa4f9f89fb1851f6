//! The transaction applier — the only component permitted to change a
//! wallet balance.
//!
//! Every operation runs the same pipeline: idempotency reservation, fresh
//! wallet read, validation, atomic append. A `ConcurrencyConflict` from the
//! store means another operation won the optimistic race; the applier
//! re-reads the wallet and retries a bounded number of times before
//! surfacing the conflict.
//!
//! Business rejections are cached in the idempotency record and returned as
//! failure results, so a retried delivery of a rejected operation answers
//! identically. Internal faults release the reservation instead — the
//! provider's retry gets a clean attempt.

use crate::errors::{WalletError, WalletResult};
use crate::ledger::idempotency::{IdempotencyGuard, Reservation};
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{
    Amount, AuditAction, AuditRecord, CallbackResult, EntryStatus, LedgerEntry, LockState,
    OperationKey, OperationType, Wallet,
};
use crate::ledger::validator::{self, DepositWindowTotals};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Actor recorded on audit rows for non-admin (provider-driven) actions
pub const SYSTEM_ACTOR: &str = "system";

/// One canonical operation extracted from a provider callback or an admin
/// request. `amount` is a positive magnitude except for `adjustment`, which
/// carries its own sign.
#[derive(Clone, Debug)]
pub struct ApplyRequest {
    pub user_id: String,
    pub provider: String,
    pub round_id: String,
    pub op: OperationType,
    pub amount: Amount,
    pub game_id: Option<String>,
    pub session_id: Option<String>,
}

impl ApplyRequest {
    fn operation_key(&self) -> OperationKey {
        OperationKey::new(&self.provider, &self.round_id, self.op)
    }

    /// Signed effect on the balance
    fn effect(&self) -> Amount {
        match self.op {
            OperationType::Adjustment => self.amount,
            op if op.is_debit() => -self.amount,
            _ => self.amount,
        }
    }
}

pub struct TransactionApplier {
    store: Arc<LedgerStore>,
    guard: IdempotencyGuard,
    max_retries: u32,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl TransactionApplier {
    pub fn new(store: Arc<LedgerStore>, guard: IdempotencyGuard, max_retries: u32) -> Self {
        Self {
            store,
            guard,
            max_retries,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Apply one operation exactly once.
    ///
    /// `Ok` carries the result to send back to the provider — including
    /// business rejections, which are normal outcomes here. `Err` means the
    /// operation was not (and may never be) applied: a duplicate still in
    /// flight, or an internal fault.
    pub fn apply(&self, req: &ApplyRequest) -> WalletResult<CallbackResult> {
        let key = req.operation_key();
        let now = now_ms();

        if req.op != OperationType::Adjustment && req.amount < 0 {
            return Err(WalletError::InvalidAmount {
                operation: req.op.to_string(),
                amount: req.amount,
            });
        }

        match self.guard.check_or_reserve(&key, now)? {
            Reservation::Duplicate(cached) => return Ok(cached),
            Reservation::InFlight => return Err(WalletError::OperationInFlight(key.to_string())),
            Reservation::Fresh => {}
        }

        let mut attempt: u32 = 0;
        loop {
            let wallet = match self.store.get_wallet(&req.user_id) {
                Ok(wallet) => wallet,
                Err(e @ WalletError::WalletNotFound(_)) => {
                    // Cache the rejection: the same round retried must
                    // answer identically
                    let result = CallbackResult::rejected(e.code(), 0, "");
                    self.guard.store_result(&key, &result, now)?;
                    return Ok(result);
                }
                Err(e) => {
                    self.guard.release(&key);
                    return Err(e);
                }
            };

            let effect = req.effect();
            if let Err(rejection) = self.validate(req, &wallet, effect, now) {
                if !rejection.is_rejection() {
                    self.guard.release(&key);
                    return Err(rejection);
                }
                let result =
                    CallbackResult::rejected(rejection.code(), wallet.balance, &wallet.currency);
                self.record_failure(req, &wallet, now);
                self.guard.store_result(&key, &result, now)?;
                info!(
                    operation_key = %key,
                    wallet = %wallet.user_id,
                    code = rejection.code(),
                    "operation rejected"
                );
                return Ok(result);
            }

            let entry = LedgerEntry {
                id: Uuid::new_v4().to_string(),
                wallet_id: wallet.user_id.clone(),
                operation_key: key.to_string(),
                entry_type: req.op,
                amount: effect,
                balance_before: wallet.balance,
                balance_after: wallet.balance + effect,
                provider: req.provider.clone(),
                game_id: req.game_id.clone(),
                session_id: req.session_id.clone(),
                status: EntryStatus::Completed,
                rolled_back_by: None,
                rollback_of: None,
                created_at: now,
            };

            match self.store.append_entry_and_update_balance(&entry) {
                Ok(()) => {
                    let result = CallbackResult::ok(entry.balance_after, &wallet.currency);
                    self.guard.store_result(&key, &result, now)?;
                    info!(
                        operation_key = %key,
                        wallet = %wallet.user_id,
                        amount = effect,
                        balance = entry.balance_after,
                        "operation applied"
                    );
                    return Ok(result);
                }
                Err(WalletError::ConcurrencyConflict(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        operation_key = %key,
                        wallet = %wallet.user_id,
                        attempt,
                        "balance moved underneath us, retrying with a fresh read"
                    );
                    continue;
                }
                Err(e @ WalletError::ConcurrencyConflict(_)) => {
                    self.guard.release(&key);
                    return Err(e);
                }
                Err(rejection) if rejection.is_rejection() => {
                    // Store-level backstop fired (e.g. overdraft detected at
                    // commit); cache it like any other rejection
                    let result = CallbackResult::rejected(
                        rejection.code(),
                        wallet.balance,
                        &wallet.currency,
                    );
                    self.record_failure(req, &wallet, now);
                    self.guard.store_result(&key, &result, now)?;
                    return Ok(result);
                }
                Err(e) => {
                    self.guard.release(&key);
                    return Err(e);
                }
            }
        }
    }

    fn validate(
        &self,
        req: &ApplyRequest,
        wallet: &Wallet,
        effect: Amount,
        now: i64,
    ) -> WalletResult<()> {
        if effect < 0 {
            validator::validate_debit(wallet, -effect)
        } else {
            let totals = if req.op == OperationType::Deposit {
                self.store.deposit_totals(&wallet.user_id, now)?
            } else {
                DepositWindowTotals::default()
            };
            validator::validate_credit(wallet, effect, req.op, &totals)
        }
    }

    /// Best-effort `failed` ledger row for a rejected operation — zero
    /// balance effect, visible to the back-office
    fn record_failure(&self, req: &ApplyRequest, wallet: &Wallet, now: i64) {
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet.user_id.clone(),
            operation_key: req.operation_key().to_string(),
            entry_type: req.op,
            amount: 0,
            balance_before: wallet.balance,
            balance_after: wallet.balance,
            provider: req.provider.clone(),
            game_id: req.game_id.clone(),
            session_id: req.session_id.clone(),
            status: EntryStatus::Failed,
            rolled_back_by: None,
            rollback_of: None,
            created_at: now,
        };
        if let Err(e) = self.store.append_failed_entry(&entry) {
            warn!(wallet = %wallet.user_id, error = %e, "could not record failed entry");
        }
    }

    /// Compensate a completed ledger entry: new `rollback` entry with the
    /// inverse amount, original flipped to `rolled_back`, audit row — one
    /// atomic batch. Fails with `AlreadyRolledBack` on a repeat.
    pub fn rollback(
        &self,
        original_entry_id: &str,
        actor: &str,
        reason: &str,
    ) -> WalletResult<LedgerEntry> {
        let mut attempt: u32 = 0;
        loop {
            let original = self.store.get_entry(original_entry_id)?;
            if original.status != EntryStatus::Completed {
                return Err(WalletError::AlreadyRolledBack(original_entry_id.to_string()));
            }

            let wallet = self.store.get_wallet(&original.wallet_id)?;
            let now = now_ms();
            let compensating = LedgerEntry {
                id: Uuid::new_v4().to_string(),
                wallet_id: wallet.user_id.clone(),
                operation_key: format!("rollback:{}", original.id),
                entry_type: OperationType::Rollback,
                amount: -original.amount,
                balance_before: wallet.balance,
                balance_after: wallet.balance - original.amount,
                provider: original.provider.clone(),
                game_id: original.game_id.clone(),
                session_id: original.session_id.clone(),
                status: EntryStatus::Completed,
                rolled_back_by: None,
                rollback_of: Some(original.id.clone()),
                created_at: now,
            };
            let audit = AuditRecord {
                id: Uuid::new_v4().to_string(),
                actor: actor.to_string(),
                action: AuditAction::RollbackTransaction,
                wallet_id: wallet.user_id.clone(),
                entry_id: Some(original.id.clone()),
                reason: reason.to_string(),
                before: serde_json::json!({
                    "balance": wallet.balance,
                    "entry_status": original.status,
                }),
                after: serde_json::json!({
                    "balance": compensating.balance_after,
                    "entry_status": EntryStatus::RolledBack,
                }),
                created_at: now,
            };

            match self.store.append_rollback_entry(&compensating, &audit) {
                Ok(()) => {
                    info!(
                        entry = %original.id,
                        compensating = %compensating.id,
                        wallet = %wallet.user_id,
                        actor,
                        "entry rolled back"
                    );
                    return Ok(compensating);
                }
                Err(WalletError::ConcurrencyConflict(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Provider-initiated rollback callback: compensates the round's bet.
    /// Deduplicated by the idempotency guard like every other callback.
    pub fn provider_rollback(
        &self,
        provider: &str,
        round_id: &str,
        user_id: &str,
    ) -> WalletResult<CallbackResult> {
        let key = OperationKey::new(provider, round_id, OperationType::Rollback);
        let now = now_ms();

        match self.guard.check_or_reserve(&key, now)? {
            Reservation::Duplicate(cached) => return Ok(cached),
            Reservation::InFlight => return Err(WalletError::OperationInFlight(key.to_string())),
            Reservation::Fresh => {}
        }

        let bet_key = OperationKey::new(provider, round_id, OperationType::Bet);
        let original = match self.store.find_entry_by_operation_key(&bet_key) {
            Ok(found) => found,
            Err(e) => {
                self.guard.release(&key);
                return Err(e);
            }
        };

        let outcome = match original {
            None => {
                let (balance, currency) = self.wallet_snapshot(user_id);
                Ok(CallbackResult::rejected(
                    "TRANSACTION_NOT_FOUND",
                    balance,
                    &currency,
                ))
            }
            Some(bet) => {
                match self.rollback(&bet.id, SYSTEM_ACTOR, "provider rollback callback") {
                    Ok(compensating) => {
                        let currency = self
                            .store
                            .get_wallet(&compensating.wallet_id)
                            .map(|w| w.currency)
                            .unwrap_or_default();
                        Ok(CallbackResult::ok(compensating.balance_after, &currency))
                    }
                    Err(rejection) if rejection.is_rejection() => {
                        let (balance, currency) = self.wallet_snapshot(user_id);
                        Ok(CallbackResult::rejected(
                            rejection.code(),
                            balance,
                            &currency,
                        ))
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(result) => {
                self.guard.store_result(&key, &result, now)?;
                Ok(result)
            }
            Err(e) => {
                self.guard.release(&key);
                Err(e)
            }
        }
    }

    pub fn freeze_wallet(&self, user_id: &str, actor: &str, reason: &str) -> WalletResult<Wallet> {
        self.set_lock_state(user_id, LockState::Frozen, actor, reason)
    }

    pub fn unfreeze_wallet(
        &self,
        user_id: &str,
        actor: &str,
        reason: &str,
    ) -> WalletResult<Wallet> {
        self.set_lock_state(user_id, LockState::Active, actor, reason)
    }

    fn set_lock_state(
        &self,
        user_id: &str,
        state: LockState,
        actor: &str,
        reason: &str,
    ) -> WalletResult<Wallet> {
        let before = self.store.get_wallet(user_id)?;
        let now = now_ms();
        let audit = AuditRecord {
            id: Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            action: if state == LockState::Frozen {
                AuditAction::FreezeWallet
            } else {
                AuditAction::UnfreezeWallet
            },
            wallet_id: user_id.to_string(),
            entry_id: None,
            reason: reason.to_string(),
            before: serde_json::json!({ "lock_state": before.lock_state }),
            after: serde_json::json!({ "lock_state": state }),
            created_at: now,
        };
        let wallet = self.store.set_lock_state(user_id, state, &audit, now)?;
        info!(wallet = %user_id, state = ?state, actor, "wallet lock state set");
        Ok(wallet)
    }

    fn wallet_snapshot(&self, user_id: &str) -> (Amount, String) {
        self.store
            .get_wallet(user_id)
            .map(|w| (w.balance, w.currency))
            .unwrap_or((0, String::new()))
    }
}
