//! Configuration management with validation and defaults

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    /// Provider tag -> family tag overrides, merged over the built-in table
    #[serde(default)]
    pub providers: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Outer per-request timeout applied by the middleware stack
    pub request_timeout_secs: u64,
    /// Bound on callback processing; exceeded requests answer in the
    /// provider's failure shape
    pub callback_timeout_ms: u64,
    /// Admin endpoints require this key in X-API-Key when set
    pub admin_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            callback_timeout_ms: 5_000,
            admin_api_key: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/wallet_data".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Bounded retries after an optimistic-concurrency conflict
    pub max_apply_retries: u32,
    /// Currency assigned to wallets created without an explicit one
    pub default_currency: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_apply_retries: 3,
            default_currency: "EUR".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// How long processed operation keys stay replayable
    pub retention_hours: u64,
    /// Interval between expired-record sweeps
    pub sweep_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            retention_hours: 24,
            sweep_interval_secs: 3_600,
        }
    }
}

impl WalletConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("{}: {}", path, e)))?;
        let config: WalletConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed(format!("{}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.server.callback_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.callback_timeout_ms".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.server.callback_timeout_ms / 1_000 > self.server.request_timeout_secs {
            return Err(ConfigError::InvalidValue {
                field: "server.callback_timeout_ms".to_string(),
                reason: "must fit inside request_timeout_secs".to_string(),
            });
        }
        if self.storage.data_directory.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_directory".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.idempotency.retention_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "idempotency.retention_hours".to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.server.callback_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn idempotency_retention_ms(&self) -> i64 {
        (self.idempotency.retention_hours * 3_600 * 1_000) as i64
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idempotency.sweep_interval_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    LoadFailed(String),
    InvalidValue { field: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed(msg) => write!(f, "Failed to load configuration: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
