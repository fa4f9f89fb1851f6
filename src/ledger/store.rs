//! Durable wallet balances and the append-only transaction log.
//!
//! Key layout (all values JSON):
//!
//! - `wallet:{user_id}`                      -> Wallet
//! - `entry:{entry_id}`                      -> LedgerEntry
//! - `opkey:{operation_key}`                 -> entry_id
//! - `walletlog:{user_id}:{inv_ts}:{id}`     -> entry_id (newest-first index)
//! - `audit:{inv_ts}:{id}`                   -> AuditRecord (newest-first)
//!
//! Newest-first ordering uses an inverted big-endian millisecond timestamp
//! in the key, so a forward prefix scan yields the most recent rows first.
//!
//! Concurrency: every balance-affecting commit runs under a per-wallet
//! stripe while it compares the caller's expected `balance_before` against
//! the stored balance and writes the wallet row plus the ledger row in one
//! RocksDB batch. Callers read wallet snapshots outside the stripe; a stale
//! snapshot surfaces as `ConcurrencyConflict` and is retried by the applier
//! with a fresh read.

use crate::errors::{WalletError, WalletResult};
use crate::ledger::types::{
    Amount, AuditAction, AuditRecord, DepositLimits, EntryStatus, LedgerEntry, LockState,
    OperationKey, OperationType, Wallet,
};
use crate::ledger::validator::DepositWindowTotals;
use crate::storage::Storage;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const WEEK_MS: i64 = 7 * DAY_MS;
const MONTH_MS: i64 = 30 * DAY_MS;

const WALLETLOG_PAGE: usize = 256;

fn wallet_key(user_id: &str) -> Vec<u8> {
    format!("wallet:{}", user_id).into_bytes()
}

fn entry_key(entry_id: &str) -> Vec<u8> {
    format!("entry:{}", entry_id).into_bytes()
}

fn opkey_key(operation_key: &str) -> Vec<u8> {
    format!("opkey:{}", operation_key).into_bytes()
}

fn inverted_ts(created_at: i64) -> [u8; 8] {
    (u64::MAX - created_at.max(0) as u64).to_be_bytes()
}

fn walletlog_prefix(user_id: &str) -> Vec<u8> {
    format!("walletlog:{}:", user_id).into_bytes()
}

fn walletlog_key(user_id: &str, created_at: i64, entry_id: &str) -> Vec<u8> {
    let mut key = walletlog_prefix(user_id);
    key.extend_from_slice(&inverted_ts(created_at));
    key.push(b':');
    key.extend_from_slice(entry_id.as_bytes());
    key
}

const AUDIT_PREFIX: &[u8] = b"audit:";

fn audit_key(created_at: i64, audit_id: &str) -> Vec<u8> {
    let mut key = AUDIT_PREFIX.to_vec();
    key.extend_from_slice(&inverted_ts(created_at));
    key.push(b':');
    key.extend_from_slice(audit_id.as_bytes());
    key
}

/// Filters for the admin audit-log listing
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub wallet_id: Option<String>,
}

impl AuditFilter {
    fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(actor) = &self.actor {
            if &record.actor != actor {
                return false;
            }
        }
        if let Some(action) = self.action {
            if record.action != action {
                return false;
            }
        }
        if let Some(wallet_id) = &self.wallet_id {
            if &record.wallet_id != wallet_id {
                return false;
            }
        }
        true
    }
}

pub struct LedgerStore {
    storage: Storage,
    // One stripe per wallet; serializes the compare-and-commit section only
    wallet_stripes: DashMap<String, Arc<Mutex<()>>>,
}

impl LedgerStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            wallet_stripes: DashMap::new(),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn stripe(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.wallet_stripes
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ------------------------------------------------------------------
    // Wallets
    // ------------------------------------------------------------------

    pub fn create_wallet(
        &self,
        user_id: &str,
        currency: &str,
        initial_balance: Amount,
        deposit_limits: DepositLimits,
        now_ms: i64,
    ) -> WalletResult<Wallet> {
        if initial_balance < 0 {
            return Err(WalletError::InvalidAmount {
                operation: "create_wallet".to_string(),
                amount: initial_balance,
            });
        }

        let stripe = self.stripe(user_id);
        let _guard = stripe.lock().expect("wallet stripe poisoned");

        if self.storage.get(&wallet_key(user_id)).is_some() {
            return Err(WalletError::WalletAlreadyExists(user_id.to_string()));
        }

        let wallet = Wallet {
            user_id: user_id.to_string(),
            currency: currency.to_string(),
            balance: initial_balance,
            lock_state: LockState::Active,
            deposit_limits,
            created_at: now_ms,
            updated_at: now_ms,
        };
        self.storage
            .put(&wallet_key(user_id), &serde_json::to_vec(&wallet)?)?;
        Ok(wallet)
    }

    pub fn get_wallet(&self, user_id: &str) -> WalletResult<Wallet> {
        let Some(bytes) = self.storage.get(&wallet_key(user_id)) else {
            return Err(WalletError::WalletNotFound(user_id.to_string()));
        };
        let wallet: Wallet = serde_json::from_slice(&bytes).map_err(|e| {
            WalletError::CorruptedData(format!("wallet row for {}: {}", user_id, e))
        })?;
        Ok(wallet)
    }

    /// Flip the wallet lock state, writing the audit record in the same
    /// batch. A no-op transition returns the wallet unchanged without an
    /// audit row.
    pub fn set_lock_state(
        &self,
        user_id: &str,
        state: LockState,
        audit: &AuditRecord,
        now_ms: i64,
    ) -> WalletResult<Wallet> {
        let stripe = self.stripe(user_id);
        let _guard = stripe.lock().expect("wallet stripe poisoned");

        let mut wallet = self.get_wallet(user_id)?;
        if wallet.lock_state == state {
            return Ok(wallet);
        }
        wallet.lock_state = state;
        wallet.updated_at = now_ms;

        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (wallet_key(user_id), serde_json::to_vec(&wallet)?),
            (
                audit_key(audit.created_at, &audit.id),
                serde_json::to_vec(audit)?,
            ),
        ];
        self.storage.batch_write(&items)?;
        Ok(wallet)
    }

    // ------------------------------------------------------------------
    // Ledger entries
    // ------------------------------------------------------------------

    /// Commit one completed entry and the matching balance update as a
    /// single atomic unit.
    ///
    /// The caller supplies `balance_before` from its wallet snapshot; if the
    /// stored balance has moved since that read, nothing is written and
    /// `ConcurrencyConflict` is returned — the optimistic-concurrency point
    /// for the whole system.
    pub fn append_entry_and_update_balance(&self, entry: &LedgerEntry) -> WalletResult<()> {
        if entry.balance_after != entry.balance_before + entry.amount {
            return Err(WalletError::CorruptedData(format!(
                "entry {} breaks conservation: {} + {} != {}",
                entry.id, entry.balance_before, entry.amount, entry.balance_after
            )));
        }
        if entry.balance_after < 0 {
            // Backstop; the validator rejects these before we get here
            return Err(WalletError::InsufficientBalance {
                available: entry.balance_before,
                requested: -entry.amount,
            });
        }

        let stripe = self.stripe(&entry.wallet_id);
        let _guard = stripe.lock().expect("wallet stripe poisoned");

        let mut wallet = self.get_wallet(&entry.wallet_id)?;
        if wallet.balance != entry.balance_before {
            return Err(WalletError::ConcurrencyConflict(entry.wallet_id.clone()));
        }
        wallet.balance = entry.balance_after;
        wallet.updated_at = entry.created_at;

        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (wallet_key(&entry.wallet_id), serde_json::to_vec(&wallet)?),
            (entry_key(&entry.id), serde_json::to_vec(entry)?),
            (
                opkey_key(&entry.operation_key),
                entry.id.as_bytes().to_vec(),
            ),
            (
                walletlog_key(&entry.wallet_id, entry.created_at, &entry.id),
                entry.id.as_bytes().to_vec(),
            ),
        ];
        self.storage.batch_write(&items)?;
        Ok(())
    }

    /// Record a validation-rejected operation. No balance movement, no
    /// operation-key claim — only the entry row and the wallet log, so the
    /// back-office can see refused bets.
    pub fn append_failed_entry(&self, entry: &LedgerEntry) -> WalletResult<()> {
        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (entry_key(&entry.id), serde_json::to_vec(entry)?),
            (
                walletlog_key(&entry.wallet_id, entry.created_at, &entry.id),
                entry.id.as_bytes().to_vec(),
            ),
        ];
        self.storage.batch_write(&items)?;
        Ok(())
    }

    /// Commit a compensating rollback entry: re-checks the original's
    /// status under the wallet stripe, flips it to `rolled_back`, applies
    /// the inverse balance movement, and lands the audit record — all in
    /// one batch.
    ///
    /// `compensating.rollback_of` must name the original entry id.
    pub fn append_rollback_entry(
        &self,
        compensating: &LedgerEntry,
        audit: &AuditRecord,
    ) -> WalletResult<()> {
        let original_id = compensating.rollback_of.as_deref().ok_or_else(|| {
            WalletError::CorruptedData(format!(
                "rollback entry {} carries no original reference",
                compensating.id
            ))
        })?;
        if compensating.balance_after != compensating.balance_before + compensating.amount {
            return Err(WalletError::CorruptedData(format!(
                "entry {} breaks conservation: {} + {} != {}",
                compensating.id,
                compensating.balance_before,
                compensating.amount,
                compensating.balance_after
            )));
        }
        if compensating.balance_after < 0 {
            return Err(WalletError::InsufficientBalance {
                available: compensating.balance_before,
                requested: -compensating.amount,
            });
        }

        let stripe = self.stripe(&compensating.wallet_id);
        let _guard = stripe.lock().expect("wallet stripe poisoned");

        let mut original = self.get_entry(original_id)?;
        if original.status != EntryStatus::Completed {
            return Err(WalletError::AlreadyRolledBack(original_id.to_string()));
        }

        let mut wallet = self.get_wallet(&compensating.wallet_id)?;
        if wallet.balance != compensating.balance_before {
            return Err(WalletError::ConcurrencyConflict(
                compensating.wallet_id.clone(),
            ));
        }
        wallet.balance = compensating.balance_after;
        wallet.updated_at = compensating.created_at;

        original.status = EntryStatus::RolledBack;
        original.rolled_back_by = Some(compensating.id.clone());

        let items: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (
                wallet_key(&compensating.wallet_id),
                serde_json::to_vec(&wallet)?,
            ),
            (
                entry_key(&compensating.id),
                serde_json::to_vec(compensating)?,
            ),
            (entry_key(&original.id), serde_json::to_vec(&original)?),
            (
                opkey_key(&compensating.operation_key),
                compensating.id.as_bytes().to_vec(),
            ),
            (
                walletlog_key(
                    &compensating.wallet_id,
                    compensating.created_at,
                    &compensating.id,
                ),
                compensating.id.as_bytes().to_vec(),
            ),
            (
                audit_key(audit.created_at, &audit.id),
                serde_json::to_vec(audit)?,
            ),
        ];
        self.storage.batch_write(&items)?;
        Ok(())
    }

    pub fn get_entry(&self, entry_id: &str) -> WalletResult<LedgerEntry> {
        let Some(bytes) = self.storage.get(&entry_key(entry_id)) else {
            return Err(WalletError::EntryNotFound(entry_id.to_string()));
        };
        let entry: LedgerEntry = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::CorruptedData(format!("entry row {}: {}", entry_id, e)))?;
        Ok(entry)
    }

    pub fn find_entry_by_operation_key(
        &self,
        key: &OperationKey,
    ) -> WalletResult<Option<LedgerEntry>> {
        let Some(id_bytes) = self.storage.get(&opkey_key(&key.to_string())) else {
            return Ok(None);
        };
        let entry_id = String::from_utf8(id_bytes)
            .map_err(|e| WalletError::CorruptedData(format!("opkey index: {}", e)))?;
        Ok(Some(self.get_entry(&entry_id)?))
    }

    /// Newest-first listing of a wallet's ledger entries
    pub fn list_wallet_entries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> WalletResult<Vec<LedgerEntry>> {
        let prefix = walletlog_prefix(user_id);
        let rows = self.storage.scan_prefix(&prefix, None, limit);
        let mut entries = Vec::with_capacity(rows.len());
        for (_key, value) in rows {
            let entry_id = String::from_utf8(value)
                .map_err(|e| WalletError::CorruptedData(format!("wallet log index: {}", e)))?;
            entries.push(self.get_entry(&entry_id)?);
        }
        Ok(entries)
    }

    /// Sum completed `deposit` entries in the rolling day/week/month
    /// windows ending at `now_ms`. Walks the newest-first wallet log and
    /// stops at the first entry older than the widest window.
    pub fn deposit_totals(&self, user_id: &str, now_ms: i64) -> WalletResult<DepositWindowTotals> {
        let day_start = now_ms - DAY_MS;
        let week_start = now_ms - WEEK_MS;
        let month_start = now_ms - MONTH_MS;

        let prefix = walletlog_prefix(user_id);
        let mut totals = DepositWindowTotals::default();
        let mut cursor: Option<Vec<u8>> = None;

        'pages: loop {
            let rows = self
                .storage
                .scan_prefix(&prefix, cursor.as_deref(), WALLETLOG_PAGE);
            if rows.is_empty() {
                break;
            }
            cursor = rows.last().map(|(key, _)| key.clone());

            for (_key, value) in rows {
                let entry_id = String::from_utf8(value)
                    .map_err(|e| WalletError::CorruptedData(format!("wallet log index: {}", e)))?;
                let entry = self.get_entry(&entry_id)?;
                if entry.created_at < month_start {
                    break 'pages;
                }
                if entry.entry_type != OperationType::Deposit
                    || entry.status != EntryStatus::Completed
                {
                    continue;
                }
                totals.monthly += entry.amount;
                if entry.created_at >= week_start {
                    totals.weekly += entry.amount;
                }
                if entry.created_at >= day_start {
                    totals.daily += entry.amount;
                }
            }
        }
        Ok(totals)
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    pub fn append_audit(&self, audit: &AuditRecord) -> WalletResult<()> {
        self.storage.put(
            &audit_key(audit.created_at, &audit.id),
            &serde_json::to_vec(audit)?,
        )?;
        Ok(())
    }

    /// Newest-first audit listing with optional filters. Scans at most a
    /// bounded multiple of `limit` rows so hostile filters cannot walk the
    /// whole keyspace.
    pub fn list_audit(&self, filter: &AuditFilter, limit: usize) -> WalletResult<Vec<AuditRecord>> {
        let scan_limit = (limit * 10).max(100);
        let rows = self.storage.scan_prefix(AUDIT_PREFIX, None, scan_limit);

        let mut records = Vec::new();
        for (_key, value) in rows {
            let record: AuditRecord = serde_json::from_slice(&value)
                .map_err(|e| WalletError::CorruptedData(format!("audit row: {}", e)))?;
            if filter.matches(&record) {
                records.push(record);
                if records.len() >= limit {
                    break;
                }
            }
        }
        Ok(records)
    }
}
