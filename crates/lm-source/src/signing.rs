//! Upstream request signing.
//!
//! Both APIs sign `timestamp + METHOD + request_path + body` with
//! HMAC-SHA256. The wallet API keys the MAC with the raw secret and sends a
//! hex digest; the exchange API keys it with the base64-decoded secret and
//! sends a base64 digest plus a passphrase header.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::SourceError;

type HmacSha256 = Hmac<Sha256>;

// Header names are lowercase; `HeaderMap` rejects static uppercase names.
pub const HEADER_KEY: &str = "cb-access-key";
pub const HEADER_SIGN: &str = "cb-access-sign";
pub const HEADER_TIMESTAMP: &str = "cb-access-timestamp";
pub const HEADER_PASSPHRASE: &str = "cb-access-passphrase";
pub const HEADER_VERSION: &str = "cb-version";

fn prehash(timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    format!(
        "{timestamp}{}{request_path}{body}",
        method.to_ascii_uppercase()
    )
}

fn mac(key: &[u8], message: &str) -> Result<Vec<u8>, SourceError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SourceError::Config(format!("hmac key rejected: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Hex HMAC-SHA256 keyed with the raw API secret.
pub fn wallet_signature(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, SourceError> {
    let digest = mac(secret.as_bytes(), &prehash(timestamp, method, request_path, body))?;
    Ok(hex::encode(digest))
}

/// Base64 HMAC-SHA256 keyed with the base64-decoded API secret.
pub fn exchange_signature(
    secret_b64: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, SourceError> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let key = b64
        .decode(secret_b64.trim())
        .map_err(|e| SourceError::Config(format!("exchange api secret is not base64: {e}")))?;
    let digest = mac(&key, &prehash(timestamp, method, request_path, body))?;
    Ok(b64.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_signature_is_hex_sha256_length() {
        let sig = wallet_signature("secret", "1700000000", "get", "/v2/accounts", "").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        // Method is upper-cased before signing.
        let upper = wallet_signature("secret", "1700000000", "GET", "/v2/accounts", "").unwrap();
        assert_eq!(sig, upper);
    }

    #[test]
    fn signature_covers_every_prehash_part() {
        let base = wallet_signature("s", "1", "GET", "/v2/user", "").unwrap();
        assert_ne!(base, wallet_signature("s", "2", "GET", "/v2/user", "").unwrap());
        assert_ne!(base, wallet_signature("s", "1", "POST", "/v2/user", "").unwrap());
        assert_ne!(base, wallet_signature("s", "1", "GET", "/v2/users", "").unwrap());
        assert_ne!(base, wallet_signature("s", "1", "GET", "/v2/user", "{}").unwrap());
    }

    #[test]
    fn exchange_signature_requires_base64_secret() {
        let b64 = base64::engine::general_purpose::STANDARD;
        let secret = b64.encode(b"exchange-secret");
        let sig = exchange_signature(&secret, "1700000000", "GET", "/accounts", "").unwrap();
        assert_eq!(b64.decode(sig).unwrap().len(), 32);

        let err = exchange_signature("not base64!!", "1", "GET", "/accounts", "").unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }
}
