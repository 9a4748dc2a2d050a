//! Builds the signed HTTP sources from settings and resolved secrets.

use lm_config::secrets::ResolvedSecrets;
use lm_config::MirrorSettings;
use lm_source::{CursorStyle, HttpCredentials, HttpSource};

/// Wallet source, plus the exchange source when it is enabled and its
/// credentials were resolved.
pub fn http_sources(
    settings: &MirrorSettings,
    secrets: &ResolvedSecrets,
) -> (HttpSource, Option<HttpSource>) {
    let w = &settings.upstream.wallet;
    let wallet = HttpSource::new(
        "wallet",
        w.base_url.clone(),
        CursorStyle::Wallet,
        HttpCredentials::Wallet {
            api_key: secrets.wallet.api_key.clone(),
            api_secret: secrets.wallet.api_secret.clone(),
        },
    )
    .with_page_limit(w.page_limit)
    .with_api_version(w.api_version.clone());

    let e = &settings.upstream.exchange;
    let exchange = match (&secrets.exchange, e.enabled) {
        (Some(creds), true) => Some(
            HttpSource::new(
                "exchange",
                e.base_url.clone(),
                CursorStyle::Exchange,
                HttpCredentials::Exchange {
                    api_key: creds.api_key.clone(),
                    api_secret_b64: creds.api_secret_b64.clone(),
                    passphrase: creds.passphrase.clone(),
                },
            )
            .with_page_limit(e.page_limit),
        ),
        _ => None,
    };

    (wallet, exchange)
}
