//! End-to-end ledger flow: bet, win, admin rollback, and persistence of
//! the resulting state across a storage reopen.

use std::sync::Arc;
use walletiq::ledger::store::AuditFilter;
use walletiq::ledger::types::{AuditAction, DepositLimits};
use walletiq::{
    ApplyRequest, EntryStatus, IdempotencyGuard, LedgerStore, OperationKey, OperationType,
    Storage, TransactionApplier,
};

const HOUR_MS: i64 = 60 * 60 * 1000;

fn build_applier(storage: Storage) -> (Arc<TransactionApplier>, Arc<LedgerStore>) {
    let store = Arc::new(LedgerStore::new(storage.clone()));
    let guard = IdempotencyGuard::new(storage, 24 * HOUR_MS);
    let applier = Arc::new(TransactionApplier::new(Arc::clone(&store), guard, 3));
    (applier, store)
}

fn callback(user: &str, round: &str, op: OperationType, amount: i64) -> ApplyRequest {
    ApplyRequest {
        user_id: user.to_string(),
        provider: "pragmatic".to_string(),
        round_id: round.to_string(),
        op,
        amount,
        game_id: Some("gates-of-olympus".to_string()),
        session_id: Some("sess-1".to_string()),
    }
}

#[test]
fn test_bet_win_rollback_scenario() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::open(dir.path()).expect("open rocksdb");
    let (applier, store) = build_applier(storage);

    // Wallet with 200.00 EUR
    store
        .create_wallet("player-1", "EUR", 20_000, DepositLimits::default(), 0)
        .unwrap();

    // Bet callback for round r1: 20.00
    let bet = applier
        .apply(&callback("player-1", "r1", OperationType::Bet, 2_000))
        .unwrap();
    assert!(bet.success);
    assert_eq!(bet.balance, 18_000);

    // Win callback for the same round: 35.00
    let win = applier
        .apply(&callback("player-1", "r1", OperationType::Win, 3_500))
        .unwrap();
    assert!(win.success);
    assert_eq!(win.balance, 21_500);

    let win_entry = store
        .find_entry_by_operation_key(&OperationKey::new("pragmatic", "r1", OperationType::Win))
        .unwrap()
        .expect("win entry recorded");
    assert_eq!(win_entry.amount, 3_500);
    assert_eq!(win_entry.status, EntryStatus::Completed);

    // Admin rolls the win back
    let compensating = applier
        .rollback(&win_entry.id, "admin-7", "duplicate win credit")
        .unwrap();
    assert_eq!(compensating.entry_type, OperationType::Rollback);
    assert_eq!(compensating.amount, -3_500);
    assert_eq!(compensating.rollback_of.as_deref(), Some(win_entry.id.as_str()));

    let wallet = store.get_wallet("player-1").unwrap();
    assert_eq!(wallet.balance, 18_000);

    let original = store.get_entry(&win_entry.id).unwrap();
    assert_eq!(original.status, EntryStatus::RolledBack);
    assert_eq!(
        original.rolled_back_by.as_deref(),
        Some(compensating.id.as_str())
    );

    // The audit trail shows the rollback with actor and reason
    let audits = store
        .list_audit(
            &AuditFilter {
                action: Some(AuditAction::RollbackTransaction),
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].actor, "admin-7");
    assert_eq!(audits[0].reason, "duplicate win credit");
    assert_eq!(audits[0].entry_id.as_deref(), Some(win_entry.id.as_str()));

    // Conservation: completed entry amounts sum to the balance delta
    let entries = store.list_wallet_entries("player-1", 50).unwrap();
    let sum: i64 = entries
        .iter()
        .filter(|e| e.status != EntryStatus::Failed)
        .map(|e| e.amount)
        .sum();
    assert_eq!(20_000 + sum, wallet.balance);
}

#[test]
fn test_duplicate_deliveries_leave_one_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::open(dir.path()).expect("open rocksdb");
    let (applier, store) = build_applier(storage);

    store
        .create_wallet("player-1", "EUR", 10_000, DepositLimits::default(), 0)
        .unwrap();

    let req = callback("player-1", "r9", OperationType::Bet, 1_500);
    let first = applier.apply(&req).unwrap();
    let second = applier.apply(&req).unwrap();
    let third = applier.apply(&req).unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(store.get_wallet("player-1").unwrap().balance, 8_500);
    assert_eq!(store.list_wallet_entries("player-1", 10).unwrap().len(), 1);
}

#[test]
fn test_state_survives_storage_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let storage = Storage::open(dir.path()).expect("open rocksdb");
        let (applier, store) = build_applier(storage);
        store
            .create_wallet("player-1", "EUR", 5_000, DepositLimits::default(), 0)
            .unwrap();
        let result = applier
            .apply(&callback("player-1", "r1", OperationType::Bet, 2_500))
            .unwrap();
        assert_eq!(result.balance, 2_500);
        // Storage dropped here, releasing the database lock
    }

    let storage = Storage::open(dir.path()).expect("reopen rocksdb");
    let (applier, store) = build_applier(storage);

    let wallet = store.get_wallet("player-1").unwrap();
    assert_eq!(wallet.balance, 2_500);

    // The idempotency record survived too: redelivery replays, not reapplies
    let replay = applier
        .apply(&callback("player-1", "r1", OperationType::Bet, 2_500))
        .unwrap();
    assert!(replay.success);
    assert_eq!(replay.balance, 2_500);
    assert_eq!(store.get_wallet("player-1").unwrap().balance, 2_500);
}
