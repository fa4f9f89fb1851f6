//! Admin back-office handlers
//!
//! Thin authenticated callers into the applier and audit log: wallet
//! provisioning, balance adjustments, transaction rollback, freeze and
//! unfreeze, audit queries. Guarded by an X-API-Key header check when a
//! key is configured.

use super::{
    errors::ApiError,
    handlers::AppState,
    middleware::RequestId,
    models::{
        AdjustBalanceRequest, AuditQuery, AuditResponse, CreateWalletRequest, FreezeRequest,
        RollbackRequest, RollbackResponse, WalletResponse,
    },
};
use crate::errors::WalletError;
use crate::ledger::applier::ApplyRequest;
use crate::ledger::store::AuditFilter;
use crate::ledger::types::{AuditAction, AuditRecord, OperationType};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const RECENT_ENTRIES: usize = 20;

fn check_admin_api_key(
    state: &AppState,
    headers: &HeaderMap,
    request_id: &str,
) -> Result<(), ApiError> {
    let Some(expected) = &state.admin_api_key else {
        // No key configured - allow for development
        return Ok(());
    };
    match headers.get("X-API-Key") {
        Some(provided) if provided.to_str().unwrap_or("") == expected => Ok(()),
        _ => Err(ApiError::unauthorized(
            request_id.to_string(),
            "Invalid or missing admin API key".to_string(),
        )),
    }
}

/// The acting admin for audit rows; falls back to "admin" when the header
/// is absent (authentication proper lives at the gateway)
fn actor_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("X-Admin-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("admin")
        .to_string()
}

fn map_wallet_error(request_id: &str, e: WalletError) -> ApiError {
    match &e {
        WalletError::WalletNotFound(_) | WalletError::EntryNotFound(_) => {
            ApiError::not_found(request_id.to_string(), e.to_string())
        }
        WalletError::WalletAlreadyExists(_) | WalletError::AlreadyRolledBack(_) => {
            ApiError::conflict(request_id.to_string(), e.to_string())
        }
        WalletError::WalletFrozen(_)
        | WalletError::InsufficientBalance { .. }
        | WalletError::LimitExceeded(_)
        | WalletError::InvalidAmount { .. }
        | WalletError::OperationInFlight(_) => {
            ApiError::bad_request(request_id.to_string(), e.to_string())
        }
        _ => ApiError::internal_error(request_id.to_string(), e.to_string()),
    }
}

/// POST /api/admin/wallets - provision a wallet
pub async fn create_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateWalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;

    let now = Utc::now().timestamp_millis();
    let currency = request
        .currency
        .unwrap_or_else(|| state.default_currency.clone());
    let wallet = state
        .store
        .create_wallet(
            &request.user_id,
            &currency,
            request.initial_balance,
            request.deposit_limits,
            now,
        )
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    let audit = AuditRecord {
        id: Uuid::new_v4().to_string(),
        actor: actor_from_headers(&headers),
        action: AuditAction::CreateWallet,
        wallet_id: wallet.user_id.clone(),
        entry_id: None,
        reason: "wallet provisioned".to_string(),
        before: serde_json::Value::Null,
        after: serde_json::json!({ "balance": wallet.balance, "currency": wallet.currency }),
        created_at: now,
    };
    state
        .store
        .append_audit(&audit)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    Ok(Json(WalletResponse::from_wallet(wallet, Vec::new())))
}

/// GET /api/admin/wallets/:user_id - wallet snapshot with recent entries
pub async fn get_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;

    let wallet = state
        .store
        .get_wallet(&user_id)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;
    let entries = state
        .store
        .list_wallet_entries(&user_id, RECENT_ENTRIES)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    Ok(Json(WalletResponse::from_wallet(wallet, entries)))
}

/// POST /api/admin/wallets/:user_id/adjust - back-office credit/debit
pub async fn adjust_balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(request): Json<AdjustBalanceRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;

    let op = match request.operation.as_str() {
        "deposit" => OperationType::Deposit,
        "withdrawal" => OperationType::Withdrawal,
        "adjustment" => OperationType::Adjustment,
        other => {
            return Err(ApiError::bad_request(
                request_id.0.clone(),
                format!("Unsupported adjustment operation: {}", other),
            ));
        }
    };

    let apply = ApplyRequest {
        user_id: user_id.clone(),
        provider: "backoffice".to_string(),
        round_id: Uuid::new_v4().to_string(),
        op,
        amount: request.amount,
        game_id: None,
        session_id: None,
    };
    let result = state
        .applier
        .apply(&apply)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;
    if !result.success {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            format!(
                "Adjustment rejected: {}",
                result.error_code.as_deref().unwrap_or("UNKNOWN")
            ),
        ));
    }

    let now = Utc::now().timestamp_millis();
    let audit = AuditRecord {
        id: Uuid::new_v4().to_string(),
        actor: actor_from_headers(&headers),
        action: AuditAction::AdjustBalance,
        wallet_id: user_id.clone(),
        entry_id: None,
        reason: request.reason,
        before: serde_json::json!({ "balance": result.balance - signed_effect(op, request.amount) }),
        after: serde_json::json!({ "balance": result.balance }),
        created_at: now,
    };
    state
        .store
        .append_audit(&audit)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    let wallet = state
        .store
        .get_wallet(&user_id)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;
    Ok(Json(WalletResponse::from_wallet(wallet, Vec::new())))
}

fn signed_effect(op: OperationType, amount: i64) -> i64 {
    match op {
        OperationType::Adjustment => amount,
        op if op.is_debit() => -amount,
        _ => amount,
    }
}

/// POST /api/admin/rollback - compensate a completed ledger entry
pub async fn rollback_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RollbackRequest>,
) -> Result<Json<RollbackResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;

    let actor = actor_from_headers(&headers);
    let compensating = state
        .applier
        .rollback(&request.entry_id, &actor, &request.reason)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    Ok(Json(RollbackResponse {
        success: true,
        compensating_entry: compensating,
    }))
}

/// POST /api/admin/wallets/:user_id/freeze
pub async fn freeze_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(request): Json<FreezeRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;
    let actor = actor_from_headers(&headers);
    let wallet = state
        .applier
        .freeze_wallet(&user_id, &actor, &request.reason)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;
    Ok(Json(WalletResponse::from_wallet(wallet, Vec::new())))
}

/// POST /api/admin/wallets/:user_id/unfreeze
pub async fn unfreeze_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;
    let actor = actor_from_headers(&headers);
    let wallet = state
        .applier
        .unfreeze_wallet(&user_id, &actor, "manual unfreeze")
        .map_err(|e| map_wallet_error(&request_id.0, e))?;
    Ok(Json(WalletResponse::from_wallet(wallet, Vec::new())))
}

/// GET /api/admin/audit - filterable audit trail, newest first
pub async fn audit_log_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditResponse>, ApiError> {
    check_admin_api_key(&state, &headers, &request_id.0)?;

    let action = match query.action.as_deref() {
        None => None,
        Some("rollback_transaction") => Some(AuditAction::RollbackTransaction),
        Some("freeze_wallet") => Some(AuditAction::FreezeWallet),
        Some("unfreeze_wallet") => Some(AuditAction::UnfreezeWallet),
        Some("adjust_balance") => Some(AuditAction::AdjustBalance),
        Some("create_wallet") => Some(AuditAction::CreateWallet),
        Some(other) => {
            return Err(ApiError::bad_request(
                request_id.0.clone(),
                format!("Unknown audit action filter: {}", other),
            ));
        }
    };

    let filter = AuditFilter {
        actor: query.actor,
        action,
        wallet_id: query.wallet_id,
    };
    let limit = query.limit.min(500);
    let records = state
        .store
        .list_audit(&filter, limit)
        .map_err(|e| map_wallet_error(&request_id.0, e))?;

    Ok(Json(AuditResponse { records }))
}
