//! Provider families: inbound field mapping and response shaping.
//!
//! Each aggregated game provider speaks its own callback dialect. The
//! family is resolved once at the router boundary from the configured
//! provider table — never inferred per-request from substring matching —
//! and unknown provider tags degrade to the generic family rather than
//! failing: callback delivery is never rejected merely because the tag is
//! unrecognized.

use crate::ledger::types::{Amount, CallbackResult, OperationType};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Wire dialect spoken by a provider integration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderFamily {
    Pragmatic,
    InfinGame,
    GitSlotPark,
    Generic,
}

impl ProviderFamily {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "pragmatic" => Some(ProviderFamily::Pragmatic),
            "infingame" | "infin" => Some(ProviderFamily::InfinGame),
            "gitslotpark" | "gsp" => Some(ProviderFamily::GitSlotPark),
            "generic" => Some(ProviderFamily::Generic),
            _ => None,
        }
    }

    /// Render the internal result into this family's wire shape
    pub fn respond(&self, result: &CallbackResult) -> Value {
        match self {
            ProviderFamily::Pragmatic => {
                if result.success {
                    json!({ "errorcode": "0", "balance": result.balance })
                } else {
                    json!({ "errorcode": "1", "balance": result.balance })
                }
            }
            ProviderFamily::GitSlotPark => {
                if result.success {
                    json!({
                        "status": "success",
                        "balance": result.balance,
                        "currency": result.currency,
                    })
                } else {
                    json!({
                        "status": "error",
                        "balance": result.balance,
                        "currency": result.currency,
                        "message": failure_message(result),
                    })
                }
            }
            ProviderFamily::InfinGame | ProviderFamily::Generic => {
                if result.success {
                    json!({ "success": true, "balance": result.balance, "error": "" })
                } else {
                    json!({
                        "success": false,
                        "balance": result.balance,
                        "error": failure_message(result),
                    })
                }
            }
        }
    }
}

fn failure_message(result: &CallbackResult) -> String {
    result
        .error_code
        .clone()
        .unwrap_or_else(|| "INTERNAL_ERROR".to_string())
}

/// Provider tag -> family table, built from configuration at startup
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    families: HashMap<String, ProviderFamily>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut families = HashMap::new();
        families.insert("pragmatic".to_string(), ProviderFamily::Pragmatic);
        families.insert("infingame".to_string(), ProviderFamily::InfinGame);
        families.insert("gitslotpark".to_string(), ProviderFamily::GitSlotPark);
        Self { families }
    }
}

impl ProviderRegistry {
    pub fn from_table(table: &HashMap<String, String>) -> Self {
        let mut registry = Self::default();
        for (tag, family_tag) in table {
            if let Some(family) = ProviderFamily::parse(family_tag) {
                registry
                    .families
                    .insert(tag.trim().to_lowercase(), family);
            }
        }
        registry
    }

    /// Unknown tags resolve to the generic family
    pub fn resolve(&self, tag: &str) -> ProviderFamily {
        self.families
            .get(&tag.trim().to_lowercase())
            .copied()
            .unwrap_or(ProviderFamily::Generic)
    }
}

/// Canonical operation parsed out of a provider callback body
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackRequest {
    pub user_id: String,
    pub round_id: String,
    pub action: CallbackAction,
    /// Minor-unit amount; absent for balance checks and rollbacks
    pub amount: Option<Amount>,
    pub game_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Bet,
    Win,
    Rollback,
    Balance,
}

impl CallbackAction {
    pub fn operation_type(&self) -> Option<OperationType> {
        match self {
            CallbackAction::Bet => Some(OperationType::Bet),
            CallbackAction::Win => Some(OperationType::Win),
            CallbackAction::Rollback => Some(OperationType::Rollback),
            CallbackAction::Balance => None,
        }
    }
}

/// Why a callback body could not be mapped to a canonical request
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CallbackParseError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

// Field aliases across the supported dialects. Lookup is first-match in
// order, so family-specific names go before the generic ones.
const USER_FIELDS: &[&str] = &["userId", "user_id", "playerId", "player_id", "member"];
const ROUND_FIELDS: &[&str] = &["roundId", "round_id", "round", "transactionId", "tx_id"];
const ACTION_FIELDS: &[&str] = &["type", "action", "method", "command"];
const AMOUNT_FIELDS: &[&str] = &["amount", "bet", "betAmount", "winAmount", "value"];
const GAME_FIELDS: &[&str] = &["gameId", "game_id", "game", "gameCode"];
const SESSION_FIELDS: &[&str] = &["sessionId", "session_id", "token", "session"];

fn string_field(body: &Value, names: &[&str]) -> Option<String> {
    for name in names {
        match body.get(name) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn amount_field(body: &Value, names: &[&str]) -> Result<Option<Amount>, CallbackParseError> {
    for name in names {
        match body.get(name) {
            Some(Value::Number(n)) => {
                let Some(v) = n.as_i64() else {
                    return Err(CallbackParseError::InvalidAmount(n.to_string()));
                };
                return Ok(Some(v));
            }
            Some(Value::String(s)) if !s.is_empty() => {
                let v = s
                    .parse::<Amount>()
                    .map_err(|_| CallbackParseError::InvalidAmount(s.clone()))?;
                return Ok(Some(v));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Map a provider callback body (already decoded to JSON) into the
/// canonical request the applier understands.
pub fn parse_callback(body: &Value) -> Result<CallbackRequest, CallbackParseError> {
    let user_id =
        string_field(body, USER_FIELDS).ok_or(CallbackParseError::MissingField("userId"))?;

    let action_tag = string_field(body, ACTION_FIELDS)
        .ok_or(CallbackParseError::MissingField("type"))?
        .to_lowercase();
    let action = match action_tag.as_str() {
        "bet" | "debit" | "wager" => CallbackAction::Bet,
        "win" | "credit" | "result" => CallbackAction::Win,
        "rollback" | "refund" | "cancel" => CallbackAction::Rollback,
        "balance" | "getbalance" => CallbackAction::Balance,
        other => return Err(CallbackParseError::UnsupportedAction(other.to_string())),
    };

    // Balance checks carry no round; everything else must
    let round_id = match string_field(body, ROUND_FIELDS) {
        Some(round) => round,
        None if action == CallbackAction::Balance => String::new(),
        None => return Err(CallbackParseError::MissingField("roundId")),
    };

    let amount = amount_field(body, AMOUNT_FIELDS)?;
    if amount.is_none() && matches!(action, CallbackAction::Bet | CallbackAction::Win) {
        return Err(CallbackParseError::MissingField("amount"));
    }

    Ok(CallbackRequest {
        user_id,
        round_id,
        action,
        amount,
        game_id: string_field(body, GAME_FIELDS),
        session_id: string_field(body, SESSION_FIELDS),
    })
}
