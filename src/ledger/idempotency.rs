//! Exactly-once protection for retried provider callbacks.
//!
//! Before any balance mutation, the applier reserves the operation key
//! here. First writer wins: the reservation is an in-flight placeholder row
//! written under a per-key stripe, so two racing deliveries of the same
//! callback can never both proceed. The loser sees either the cached result
//! (original finished) or an in-flight marker (original still running — the
//! router answers "retry later", never double-applies).
//!
//! Records carry an expiry so the table stays bounded; a periodic sweep
//! deletes expired rows.

use crate::errors::{WalletError, WalletResult};
use crate::ledger::types::{CallbackResult, IdempotencyRecord, IdempotencyStatus, OperationKey};
use crate::storage::Storage;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const IDEM_PREFIX: &[u8] = b"idem:";
const SWEEP_PAGE: usize = 512;

fn idem_key(operation_key: &str) -> Vec<u8> {
    let mut key = IDEM_PREFIX.to_vec();
    key.extend_from_slice(operation_key.as_bytes());
    key
}

/// Outcome of a reservation attempt
#[derive(Clone, Debug)]
pub enum Reservation {
    /// Key was free (or expired); an in-flight placeholder now holds it
    Fresh,
    /// Key already processed; replay this result verbatim
    Duplicate(CallbackResult),
    /// Key reserved but the original processing has not finished
    InFlight,
}

pub struct IdempotencyGuard {
    storage: Storage,
    key_stripes: DashMap<String, Arc<Mutex<()>>>,
    retention_ms: i64,
}

impl IdempotencyGuard {
    pub fn new(storage: Storage, retention_ms: i64) -> Self {
        Self {
            storage,
            key_stripes: DashMap::new(),
            retention_ms,
        }
    }

    fn stripe(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_stripes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomically claim `key` or report how it is already taken.
    pub fn check_or_reserve(&self, key: &OperationKey, now_ms: i64) -> WalletResult<Reservation> {
        let key_str = key.to_string();
        let stripe = self.stripe(&key_str);
        let _guard = stripe.lock().expect("idempotency stripe poisoned");

        let storage_key = idem_key(&key_str);
        if let Some(bytes) = self.storage.get(&storage_key) {
            let record: IdempotencyRecord = serde_json::from_slice(&bytes)
                .map_err(|e| WalletError::CorruptedData(format!("idempotency row: {}", e)))?;
            if record.expires_at > now_ms {
                return Ok(match (record.status, record.result) {
                    (IdempotencyStatus::Completed, Some(result)) => {
                        debug!(operation_key = %key_str, "replaying cached callback result");
                        Reservation::Duplicate(result)
                    }
                    _ => Reservation::InFlight,
                });
            }
            // Expired reservation: the key is free again
        }

        let placeholder = IdempotencyRecord {
            operation_key: key_str.clone(),
            status: IdempotencyStatus::InFlight,
            result: None,
            created_at: now_ms,
            expires_at: now_ms + self.retention_ms,
        };
        self.storage
            .put(&storage_key, &serde_json::to_vec(&placeholder)?)?;
        Ok(Reservation::Fresh)
    }

    /// Finalize a reservation with the result future duplicates will replay.
    pub fn store_result(
        &self,
        key: &OperationKey,
        result: &CallbackResult,
        now_ms: i64,
    ) -> WalletResult<()> {
        let key_str = key.to_string();
        let stripe = self.stripe(&key_str);
        let _guard = stripe.lock().expect("idempotency stripe poisoned");

        let record = IdempotencyRecord {
            operation_key: key_str.clone(),
            status: IdempotencyStatus::Completed,
            result: Some(result.clone()),
            created_at: now_ms,
            expires_at: now_ms + self.retention_ms,
        };
        self.storage
            .put(&idem_key(&key_str), &serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Drop a reservation after an internal fault so the provider's retry
    /// can reprocess the operation cleanly. Never called for business
    /// rejections — those are cached like any other outcome.
    pub fn release(&self, key: &OperationKey) {
        let key_str = key.to_string();
        let stripe = self.stripe(&key_str);
        let _guard = stripe.lock().expect("idempotency stripe poisoned");
        if let Err(e) = self.storage.delete(&idem_key(&key_str)) {
            warn!(operation_key = %key_str, error = %e, "failed to release idempotency reservation");
        }
    }

    /// Delete expired records. Returns the number removed.
    pub fn sweep_expired(&self, now_ms: i64) -> WalletResult<usize> {
        let mut removed = 0;
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let rows = self
                .storage
                .scan_prefix(IDEM_PREFIX, cursor.as_deref(), SWEEP_PAGE);
            if rows.is_empty() {
                break;
            }
            cursor = rows.last().map(|(key, _)| key.clone());

            for (key, value) in rows {
                let Ok(record) = serde_json::from_slice::<IdempotencyRecord>(&value) else {
                    warn!("dropping undecodable idempotency row");
                    self.storage.delete(&key)?;
                    removed += 1;
                    continue;
                };
                if record.expires_at <= now_ms {
                    self.storage.delete(&key)?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!(removed, "idempotency sweep finished");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::OperationType;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn guard() -> (IdempotencyGuard, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::open(dir.path()).expect("open rocksdb");
        (IdempotencyGuard::new(storage, 24 * HOUR_MS), dir)
    }

    fn key() -> OperationKey {
        OperationKey::new("pragmatic", "r-1", OperationType::Bet)
    }

    #[test]
    fn test_fresh_then_in_flight_then_duplicate() {
        let (guard, _dir) = guard();
        let k = key();

        assert!(matches!(
            guard.check_or_reserve(&k, 1_000).unwrap(),
            Reservation::Fresh
        ));
        // Same key while unfinished: in flight, not a second Fresh
        assert!(matches!(
            guard.check_or_reserve(&k, 1_001).unwrap(),
            Reservation::InFlight
        ));

        let result = CallbackResult::ok(18_000, "EUR");
        guard.store_result(&k, &result, 1_002).unwrap();

        match guard.check_or_reserve(&k, 1_003).unwrap() {
            Reservation::Duplicate(cached) => assert_eq!(cached, result),
            other => panic!("expected duplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_release_frees_the_key() {
        let (guard, _dir) = guard();
        let k = key();
        assert!(matches!(
            guard.check_or_reserve(&k, 1_000).unwrap(),
            Reservation::Fresh
        ));
        guard.release(&k);
        assert!(matches!(
            guard.check_or_reserve(&k, 1_001).unwrap(),
            Reservation::Fresh
        ));
    }

    #[test]
    fn test_expired_record_is_reclaimed_and_swept() {
        let (guard, _dir) = guard();
        let k = key();
        guard.check_or_reserve(&k, 0).unwrap();
        guard
            .store_result(&k, &CallbackResult::ok(100, "EUR"), 0)
            .unwrap();

        let after_retention = 24 * HOUR_MS + 1;
        // Lookup past expiry treats the key as free
        assert!(matches!(
            guard.check_or_reserve(&k, after_retention).unwrap(),
            Reservation::Fresh
        ));
        guard
            .store_result(&k, &CallbackResult::ok(100, "EUR"), after_retention)
            .unwrap();

        // Nothing expired yet at this instant
        assert_eq!(guard.sweep_expired(after_retention + 1).unwrap(), 0);
        assert_eq!(
            guard.sweep_expired(after_retention + 24 * HOUR_MS + 1).unwrap(),
            1
        );
    }

    #[test]
    fn test_distinct_rounds_are_independent() {
        let (guard, _dir) = guard();
        let first = OperationKey::new("pragmatic", "r-1", OperationType::Bet);
        let second = OperationKey::new("pragmatic", "r-2", OperationType::Bet);

        assert!(matches!(
            guard.check_or_reserve(&first, 1_000).unwrap(),
            Reservation::Fresh
        ));
        assert!(matches!(
            guard.check_or_reserve(&second, 1_000).unwrap(),
            Reservation::Fresh
        ));
    }
}
