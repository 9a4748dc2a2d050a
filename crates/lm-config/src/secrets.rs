//! Runtime secret resolution.
//!
//! Config stores env var NAMES (`upstream.*.keys_env.*`). [`resolve_secrets`]
//! reads the named variables once at startup; callers pass the result into
//! source constructors instead of reading the environment themselves.
//! `Debug` output redacts every value and errors name the variable only.

use anyhow::{bail, Result};

use crate::MirrorSettings;

#[derive(Clone)]
pub struct WalletSecrets {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for WalletSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSecrets")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .finish()
    }
}

#[derive(Clone)]
pub struct ExchangeSecrets {
    pub api_key: String,
    pub api_secret_b64: String,
    pub passphrase: String,
}

impl std::fmt::Debug for ExchangeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSecrets")
            .field("api_key", &"<REDACTED>")
            .field("api_secret_b64", &"<REDACTED>")
            .field("passphrase", &"<REDACTED>")
            .finish()
    }
}

/// Credentials for one ingest run. `exchange` is `None` when the exchange
/// API is disabled in config.
#[derive(Clone, Debug)]
pub struct ResolvedSecrets {
    pub wallet: WalletSecrets,
    pub exchange: Option<ExchangeSecrets>,
}

/// Reads `var`; an unset or blank variable is `None`.
pub fn resolve_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require(var: &str, purpose: &str) -> Result<String> {
    match resolve_env(var) {
        Some(v) => Ok(v),
        None => bail!("SECRETS_MISSING {purpose}: env var '{var}' is not set"),
    }
}

/// Resolve every credential the configured sources need.
///
/// Wallet credentials are always required; exchange credentials only when
/// `upstream.exchange.enabled` is true.
pub fn resolve_secrets(settings: &MirrorSettings) -> Result<ResolvedSecrets> {
    let w = &settings.upstream.wallet.keys_env;
    let wallet = WalletSecrets {
        api_key: require(&w.api_key, "wallet api key")?,
        api_secret: require(&w.api_secret, "wallet api secret")?,
    };

    let exchange = if settings.upstream.exchange.enabled {
        let e = &settings.upstream.exchange.keys_env;
        Some(ExchangeSecrets {
            api_key: require(&e.api_key, "exchange api key")?,
            api_secret_b64: require(&e.api_secret, "exchange api secret")?,
            passphrase: require(&e.passphrase, "exchange passphrase")?,
        })
    } else {
        None
    };

    Ok(ResolvedSecrets { wallet, exchange })
}
