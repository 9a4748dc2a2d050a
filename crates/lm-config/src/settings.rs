//! Typed view of the merged config document.
//!
//! Every section is optional; omitted keys take the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DB_URL_ENV: &str = "LM_DATABASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub upstream: UpstreamSettings,
    pub ingest: IngestSettings,
    pub db: DbSettings,
}

impl MirrorSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("config does not match mirror settings")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub wallet: WalletSettings,
    pub exchange: ExchangeSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    pub base_url: String,
    /// Sent as the `CB-VERSION` header.
    pub api_version: String,
    pub page_limit: u32,
    pub keys_env: WalletKeysEnv,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.coinbase.com".to_string(),
            api_version: "2016-02-18".to_string(),
            page_limit: 100,
            keys_env: WalletKeysEnv::default(),
        }
    }
}

/// Environment variable NAMES holding the wallet API credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletKeysEnv {
    pub api_key: String,
    pub api_secret: String,
}

impl Default for WalletKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "LM_WALLET_API_KEY".to_string(),
            api_secret: "LM_WALLET_API_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Exchange collections are walked only when enabled.
    pub enabled: bool,
    pub base_url: String,
    pub page_limit: u32,
    pub keys_env: ExchangeKeysEnv,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.exchange.coinbase.com".to_string(),
            page_limit: 100,
            keys_env: ExchangeKeysEnv::default(),
        }
    }
}

/// Environment variable NAMES holding the exchange API credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeKeysEnv {
    pub api_key: String,
    /// Base64-encoded signing secret.
    pub api_secret: String,
    pub passphrase: String,
}

impl Default for ExchangeKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "LM_EXCHANGE_API_KEY".to_string(),
            api_secret: "LM_EXCHANGE_API_SECRET".to_string(),
            passphrase: "LM_EXCHANGE_API_PASSPHRASE".to_string(),
        }
    }
}

/// What the orchestrator does after a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Report the record and continue with the next one.
    #[default]
    Skip,
    /// Stop the current collection at the first failed record.
    Halt,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Skip => "skip",
            FailurePolicy::Halt => "halt",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Restricts the run to these collections; `None` walks the whole plan.
    pub collections: Option<Vec<String>>,
    pub on_failure: FailurePolicy,
    /// When set, flat records are appended here as JSON Lines.
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    pub url_env: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            url_env: DEFAULT_DB_URL_ENV.to_string(),
        }
    }
}
