//! HTTP-level tests for the callback router and admin surface.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use walletiq::api::handlers::AppState;
use walletiq::api::middleware::request_id_middleware;
use walletiq::api::routes::create_router;
use walletiq::ledger::types::DepositLimits;
use walletiq::{
    IdempotencyGuard, LedgerStore, ProviderRegistry, Storage, TransactionApplier,
};

const HOUR_MS: i64 = 60 * 60 * 1000;

fn test_app(admin_api_key: Option<&str>) -> (axum::Router, Arc<AppState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::open(dir.path()).expect("open rocksdb");
    let store = Arc::new(LedgerStore::new(storage.clone()));
    let guard = IdempotencyGuard::new(storage, 24 * HOUR_MS);
    let applier = Arc::new(TransactionApplier::new(Arc::clone(&store), guard, 3));

    let state = Arc::new(AppState {
        store,
        applier,
        providers: ProviderRegistry::default(),
        admin_api_key: admin_api_key.map(String::from),
        callback_timeout: Duration::from_secs(5),
        default_currency: "EUR".to_string(),
        version: "test".to_string(),
    });

    let app = create_router(Arc::clone(&state))
        .layer(axum::middleware::from_fn(request_id_middleware));
    (app, state, dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _state, _dir) = test_app(None);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Running");
}

#[tokio::test]
async fn test_preflight_answers_with_fixed_headers() {
    let (app, _state, _dir) = test_app(None);
    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/seamless/pragmatic")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "POST, GET, OPTIONS"
    );
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );
}

#[tokio::test]
async fn test_pragmatic_bet_success_shape() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 20_000, DepositLimits::default(), 0)
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/seamless/pragmatic",
            json!({ "userId": "u-1", "roundId": "r1", "type": "bet", "amount": 2000 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "errorcode": "0", "balance": 18_000 }));
}

#[tokio::test]
async fn test_pragmatic_rejection_is_http_200() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 500, DepositLimits::default(), 0)
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/seamless/pragmatic",
            json!({ "userId": "u-1", "roundId": "r1", "type": "bet", "amount": 2000 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "errorcode": "1", "balance": 500 }));
}

#[tokio::test]
async fn test_unknown_provider_degrades_to_generic_shape() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 10_000, DepositLimits::default(), 0)
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/seamless/acme-slots",
            json!({ "userId": "u-1", "roundId": "r1", "type": "bet", "amount": 1000 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "success": true, "balance": 9_000, "error": "" })
    );
}

#[tokio::test]
async fn test_form_encoded_callback() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "USD", 10_000, DepositLimits::default(), 0)
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/seamless/gitslotpark")
                .header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(Body::from(
                    "userId=u-1&roundId=r7&type=bet&amount=2500",
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "status": "success", "balance": 7_500, "currency": "USD" })
    );
}

#[tokio::test]
async fn test_balance_callback_reads_without_mutating() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 4_200, DepositLimits::default(), 0)
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/api/seamless/infingame",
            json!({ "userId": "u-1", "type": "balance" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "success": true, "balance": 4_200, "error": "" })
    );
    assert_eq!(state.store.get_wallet("u-1").unwrap().balance, 4_200);
    assert!(state.store.list_wallet_entries("u-1", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_callback_is_a_client_error() {
    let (app, _state, _dir) = test_app(None);

    // Parseable body, but no mappable fields
    let response = app
        .oneshot(post_json(
            "/api/seamless/pragmatic",
            json!({ "something": "else" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_callback_replays_identical_body() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 10_000, DepositLimits::default(), 0)
        .unwrap();

    let request_body = json!({ "userId": "u-1", "roundId": "r1", "type": "bet", "amount": 1000 });

    let first = app
        .clone()
        .oneshot(post_json("/api/seamless/pragmatic", request_body.clone()))
        .await
        .unwrap();
    let second = app
        .oneshot(post_json("/api/seamless/pragmatic", request_body))
        .await
        .unwrap();

    let first_body = body_json(first).await;
    let second_body = body_json(second).await;
    assert_eq!(first_body, second_body);
    assert_eq!(state.store.get_wallet("u-1").unwrap().balance, 9_000);
}

#[tokio::test]
async fn test_admin_requires_api_key_when_configured() {
    let (app, _state, _dir) = test_app(Some("sekret"));

    let denied = app
        .clone()
        .oneshot(post_json(
            "/api/admin/wallets",
            json!({ "user_id": "u-1", "initial_balance": 1000 }),
        ))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/wallets")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-API-Key", "sekret")
                .body(Body::from(
                    json!({ "user_id": "u-1", "initial_balance": 1000 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    let body = body_json(allowed).await;
    assert_eq!(body["balance"], 1000);
    assert_eq!(body["currency"], "EUR");
}

#[tokio::test]
async fn test_admin_rollback_and_audit_over_http() {
    let (app, state, _dir) = test_app(None);
    state
        .store
        .create_wallet("u-1", "EUR", 20_000, DepositLimits::default(), 0)
        .unwrap();

    // Bet through the callback route
    let bet = app
        .clone()
        .oneshot(post_json(
            "/api/seamless/pragmatic",
            json!({ "userId": "u-1", "roundId": "r1", "type": "bet", "amount": 2000 }),
        ))
        .await
        .unwrap();
    assert_eq!(bet.status(), StatusCode::OK);

    let entry = state.store.list_wallet_entries("u-1", 10).unwrap().remove(0);

    let rollback = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/rollback")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Admin-Id", "admin-7")
                .body(Body::from(
                    json!({ "entry_id": entry.id, "reason": "player dispute" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rollback.status(), StatusCode::OK);
    let body = body_json(rollback).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["compensating_entry"]["amount"], 2000);

    assert_eq!(state.store.get_wallet("u-1").unwrap().balance, 20_000);

    // A second rollback of the same entry conflicts
    let repeat = app
        .clone()
        .oneshot(post_json(
            "/api/admin/rollback",
            json!({ "entry_id": entry.id, "reason": "again" }),
        ))
        .await
        .unwrap();
    assert_eq!(repeat.status(), StatusCode::CONFLICT);

    // And the audit trail records the first one
    let audit = app
        .oneshot(
            Request::get("/api/admin/audit?action=rollback_transaction&wallet_id=u-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(audit.status(), StatusCode::OK);
    let body = body_json(audit).await;
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["actor"], "admin-7");
    assert_eq!(records[0]["reason"], "player dispute");
}
