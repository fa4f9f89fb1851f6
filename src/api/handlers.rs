//! Request Handlers
//!
//! Provider-facing callback endpoint and health check. Business outcomes —
//! including rejections — always answer HTTP 200 in the provider's own
//! shape; HTTP error statuses are reserved for malformed requests and
//! internal faults.

use super::{errors::ApiError, middleware::RequestId, models::HealthResponse};
use crate::errors::WalletError;
use crate::ledger::applier::{ApplyRequest, TransactionApplier};
use crate::ledger::store::LedgerStore;
use crate::ledger::types::{Amount, CallbackResult};
use crate::providers::{
    parse_callback, CallbackAction, ProviderFamily, ProviderRegistry,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Shared application state
pub struct AppState {
    pub store: Arc<LedgerStore>,
    pub applier: Arc<TransactionApplier>,
    pub providers: ProviderRegistry,
    pub admin_api_key: Option<String>,
    pub callback_timeout: Duration,
    pub default_currency: String,
    pub version: String,
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// Fixed preflight answer for the callback route: 204, no body,
/// the header set providers integrate against.
/// OPTIONS /api/seamless/:provider
pub async fn seamless_preflight_handler() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, GET, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, Authorization",
            ),
        ],
    )
        .into_response()
}

/// Seamless wallet callback entry point
/// POST /api/seamless/:provider
///
/// The provider tag selects the response dialect (unknown tags degrade to
/// the generic one) and the body is accepted as JSON or form-encoded.
pub async fn seamless_callback_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let family = state.providers.resolve(&provider);

    let Some(payload) = decode_body(&headers, &body) else {
        return ApiError::bad_request(
            request_id.0,
            "Callback body is neither valid JSON nor form-encoded".to_string(),
        )
        .into_response();
    };

    let request = match parse_callback(&payload) {
        Ok(request) => request,
        Err(e) => {
            return ApiError::bad_request(request_id.0, format!("Invalid callback: {}", e))
                .into_response();
        }
    };

    // Balance checks never touch the applier
    if request.action == CallbackAction::Balance {
        let result = match state.store.get_wallet(&request.user_id) {
            Ok(wallet) => CallbackResult::ok(wallet.balance, &wallet.currency),
            Err(e @ WalletError::WalletNotFound(_)) => {
                CallbackResult::rejected(e.code(), 0, "")
            }
            Err(e) => {
                error!(request_id = %request_id.0, error = %e, "balance lookup failed");
                return internal_fault_response(request_id.0);
            }
        };
        return provider_response(family, &result);
    }

    let user_id = request.user_id.clone();
    let provider_tag = provider.clone();
    let applier = Arc::clone(&state.applier);
    let work = tokio::task::spawn_blocking(move || match request.action {
        CallbackAction::Rollback => {
            applier.provider_rollback(&provider_tag, &request.round_id, &request.user_id)
        }
        _ => {
            let op = request
                .action
                .operation_type()
                .expect("bet/win map to operation types");
            applier.apply(&ApplyRequest {
                user_id: request.user_id.clone(),
                provider: provider_tag.clone(),
                round_id: request.round_id.clone(),
                op,
                amount: request.amount.unwrap_or(0),
                game_id: request.game_id.clone(),
                session_id: request.session_id.clone(),
            })
        }
    });

    match tokio::time::timeout(state.callback_timeout, work).await {
        // A timed-out request that completed on the store side is
        // reconciled by the idempotency guard on the provider's retry
        Err(_) => {
            warn!(request_id = %request_id.0, provider = %provider, "callback processing timed out");
            let (balance, currency) = wallet_snapshot(&state, &user_id);
            provider_response(
                family,
                &CallbackResult::rejected("TIMEOUT", balance, &currency),
            )
        }
        Ok(Err(join_error)) => {
            error!(request_id = %request_id.0, error = %join_error, "callback task failed");
            internal_fault_response(request_id.0)
        }
        Ok(Ok(Ok(result))) => provider_response(family, &result),
        Ok(Ok(Err(e))) if e.is_rejection() => {
            let (balance, currency) = wallet_snapshot(&state, &user_id);
            provider_response(
                family,
                &CallbackResult::rejected(e.code(), balance, &currency),
            )
        }
        Ok(Ok(Err(e @ WalletError::ConcurrencyConflict(_)))) => {
            // Retries exhausted inside the applier
            warn!(request_id = %request_id.0, error = %e, "conflict retries exhausted");
            let (balance, currency) = wallet_snapshot(&state, &user_id);
            provider_response(
                family,
                &CallbackResult::rejected(e.code(), balance, &currency),
            )
        }
        Ok(Ok(Err(e))) => {
            error!(request_id = %request_id.0, error = %e, "callback processing failed");
            internal_fault_response(request_id.0)
        }
    }
}

/// 500 with a generic-shape failure body; no internal detail crosses the
/// boundary beyond a short code
fn internal_fault_response(request_id: String) -> Response {
    let body = ProviderFamily::Generic.respond(&CallbackResult::rejected("INTERNAL_ERROR", 0, ""));
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    if let Ok(value) = request_id.parse() {
        response
            .headers_mut()
            .insert(super::middleware::REQUEST_ID_HEADER, value);
    }
    response
}

fn provider_response(family: ProviderFamily, result: &CallbackResult) -> Response {
    (StatusCode::OK, Json(family.respond(result))).into_response()
}

fn wallet_snapshot(state: &AppState, user_id: &str) -> (Amount, String) {
    state
        .store
        .get_wallet(user_id)
        .map(|w| (w.balance, w.currency))
        .unwrap_or((0, String::new()))
}

/// Decode a callback body: JSON when the content type says so, otherwise
/// form-encoded, otherwise a best-effort attempt at both.
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Option<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("json") {
        return serde_json::from_slice(body).ok();
    }
    if content_type.contains("x-www-form-urlencoded") {
        return form_to_value(body);
    }
    serde_json::from_slice(body)
        .ok()
        .or_else(|| form_to_value(body))
}

fn form_to_value(body: &Bytes) -> Option<Value> {
    let fields: HashMap<String, String> = serde_urlencoded::from_bytes(body).ok()?;
    if fields.is_empty() {
        return None;
    }
    Some(Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_json_and_form() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = Bytes::from_static(br#"{"userId":"u-1","amount":100}"#);
        let value = decode_body(&headers, &body).unwrap();
        assert_eq!(value["userId"], "u-1");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        let body = Bytes::from_static(b"userId=u-1&type=bet&roundId=r1&amount=100");
        let value = decode_body(&headers, &body).unwrap();
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["amount"], "100");
    }

    #[test]
    fn test_decode_body_sniffs_without_content_type() {
        let headers = HeaderMap::new();
        let json = Bytes::from_static(br#"{"a":1}"#);
        assert!(decode_body(&headers, &json).is_some());

        let form = Bytes::from_static(b"a=1&b=2");
        let value = decode_body(&headers, &form).unwrap();
        assert_eq!(value["b"], "2");
    }
}
