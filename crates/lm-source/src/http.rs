//! Signed HTTP page source for the wallet and exchange APIs.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use url::form_urlencoded;

use crate::signing::{self, HEADER_KEY, HEADER_PASSPHRASE, HEADER_SIGN, HEADER_TIMESTAMP, HEADER_VERSION};
use crate::{Page, PageRequest, PageSource, SourceError};

/// Response header carrying the exchange API's "older page" cursor.
pub const EXCHANGE_CURSOR_HEADER: &str = "cb-after";

/// How a source encodes pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// `{"pagination": {...}, "data": ...}` bodies; cursor sent as `starting_after`.
    Wallet,
    /// Bare array bodies; cursor from the `CB-AFTER` header, sent as `after`.
    Exchange,
}

impl CursorStyle {
    fn cursor_param(&self) -> &'static str {
        match self {
            CursorStyle::Wallet => "starting_after",
            CursorStyle::Exchange => "after",
        }
    }
}

/// Credentials for request signing. Values are redacted in `Debug` output.
#[derive(Clone)]
pub enum HttpCredentials {
    Anonymous,
    Wallet {
        api_key: String,
        api_secret: String,
    },
    Exchange {
        api_key: String,
        api_secret_b64: String,
        passphrase: String,
    },
}

impl fmt::Debug for HttpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpCredentials::Anonymous => f.write_str("Anonymous"),
            HttpCredentials::Wallet { .. } => f
                .debug_struct("Wallet")
                .field("api_key", &"<REDACTED>")
                .field("api_secret", &"<REDACTED>")
                .finish(),
            HttpCredentials::Exchange { .. } => f
                .debug_struct("Exchange")
                .field("api_key", &"<REDACTED>")
                .field("api_secret_b64", &"<REDACTED>")
                .field("passphrase", &"<REDACTED>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    http: reqwest::Client,
    base_url: String,
    style: CursorStyle,
    credentials: HttpCredentials,
    page_limit: Option<u32>,
    api_version: Option<String>,
}

impl HttpSource {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        style: CursorStyle,
        credentials: HttpCredentials,
    ) -> Self {
        Self {
            name: name.into(),
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            style,
            credentials,
            page_limit: None,
            api_version: None,
        }
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// Value of the `CB-VERSION` header sent to the wallet API.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Path plus encoded query, exactly as signed.
    fn request_path(&self, req: &PageRequest) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &req.query {
            query.append_pair(k, v);
        }
        if let Some(limit) = self.page_limit {
            query.append_pair("limit", &limit.to_string());
        }
        if let Some(cursor) = &req.cursor {
            query.append_pair(self.style.cursor_param(), cursor);
        }
        let query = query.finish();
        if query.is_empty() {
            req.path.clone()
        } else {
            format!("{}?{}", req.path, query)
        }
    }

    fn auth_headers(&self, request_path: &str) -> Result<HeaderMap, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(v) = &self.api_version {
            headers.insert(HEADER_VERSION, header_value(v)?);
        }

        let timestamp = chrono::Utc::now().timestamp().to_string();
        match &self.credentials {
            HttpCredentials::Anonymous => {}
            HttpCredentials::Wallet {
                api_key,
                api_secret,
            } => {
                let sign = signing::wallet_signature(api_secret, &timestamp, "GET", request_path, "")?;
                headers.insert(HEADER_KEY, header_value(api_key)?);
                headers.insert(HEADER_SIGN, header_value(&sign)?);
                headers.insert(HEADER_TIMESTAMP, header_value(&timestamp)?);
            }
            HttpCredentials::Exchange {
                api_key,
                api_secret_b64,
                passphrase,
            } => {
                let sign =
                    signing::exchange_signature(api_secret_b64, &timestamp, "GET", request_path, "")?;
                headers.insert(HEADER_KEY, header_value(api_key)?);
                headers.insert(HEADER_SIGN, header_value(&sign)?);
                headers.insert(HEADER_TIMESTAMP, header_value(&timestamp)?);
                headers.insert(HEADER_PASSPHRASE, header_value(passphrase)?);
            }
        }
        Ok(headers)
    }
}

fn header_value(s: &str) -> Result<HeaderValue, SourceError> {
    HeaderValue::from_str(s).map_err(|e| SourceError::Config(format!("invalid header value: {e}")))
}

#[async_trait::async_trait]
impl PageSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, req: &PageRequest) -> Result<Page, SourceError> {
        let request_path = self.request_path(req);
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request_path);
        let headers = self.auth_headers(&request_path)?;

        let resp = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("GET {request_path}: {e}")))?;

        let status = resp.status();
        let after_header = resp
            .headers()
            .get(EXCHANGE_CURSOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp
            .text()
            .await
            .map_err(|e| SourceError::Transport(format!("GET {request_path}: read body: {e}")))?;

        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| SourceError::Decode(format!("GET {request_path}: {e}")))?;

        match self.style {
            CursorStyle::Wallet => decode_wallet_page(body),
            CursorStyle::Exchange => decode_exchange_page(body, after_header),
        }
    }
}

fn decode_wallet_page(body: Value) -> Result<Page, SourceError> {
    let next_cursor = wallet_cursor(&body);
    let documents = match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single],
        },
        other => {
            return Err(SourceError::Decode(format!(
                "wallet page must be an object, got {other}"
            )))
        }
    };
    Ok(Page {
        documents,
        next_cursor,
    })
}

/// `next_starting_after` when present, else the `starting_after` parameter of
/// `next_uri`.
fn wallet_cursor(body: &Value) -> Option<String> {
    let pagination = body.get("pagination")?;
    if let Some(c) = pagination.get("next_starting_after").and_then(Value::as_str) {
        if !c.is_empty() {
            return Some(c.to_string());
        }
    }
    let next_uri = pagination.get("next_uri").and_then(Value::as_str)?;
    let base = url::Url::parse("https://upstream.invalid/").ok()?;
    let parsed = base.join(next_uri).ok()?;
    let found = parsed
        .query_pairs()
        .find(|(k, _)| k == "starting_after")
        .map(|(_, v)| v.into_owned());
    found
}

fn decode_exchange_page(body: Value, after: Option<String>) -> Result<Page, SourceError> {
    let documents = match body {
        Value::Array(items) => items,
        Value::Object(_) => vec![body],
        other => {
            return Err(SourceError::Decode(format!(
                "exchange page must be an array, got {other}"
            )))
        }
    };
    // The exchange API keeps returning a cursor on the last page; an empty
    // page is the end.
    let next_cursor = if documents.is_empty() {
        None
    } else {
        after.filter(|c| !c.is_empty())
    };
    Ok(Page {
        documents,
        next_cursor,
    })
}

fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.get("message")
            .and_then(Value::as_str)
            .or_else(|| {
                v.get("errors")
                    .and_then(|e| e.get(0))
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
    });
    from_json.unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wallet_cursor_prefers_next_starting_after() {
        let body = json!({"pagination": {"next_starting_after": "abc", "next_uri": "/v2/x?starting_after=zzz"}});
        assert_eq!(wallet_cursor(&body).as_deref(), Some("abc"));

        let body = json!({"pagination": {"next_starting_after": null, "next_uri": "/v2/accounts?limit=25&starting_after=def"}});
        assert_eq!(wallet_cursor(&body).as_deref(), Some("def"));

        let body = json!({"pagination": {"next_starting_after": null, "next_uri": null}});
        assert_eq!(wallet_cursor(&body), None);
    }

    #[test]
    fn request_path_orders_query_then_limit_then_cursor() {
        let src = HttpSource::new("w", "http://x", CursorStyle::Wallet, HttpCredentials::Anonymous)
            .with_page_limit(100);
        let mut req = PageRequest::new("/v2/accounts").with_query(vec![("order".into(), "asc".into())]);
        req.cursor = Some("c 1".into());
        assert_eq!(
            src.request_path(&req),
            "/v2/accounts?order=asc&limit=100&starting_after=c+1"
        );
    }

    #[test]
    fn exchange_empty_page_ends_walk_even_with_header() {
        let page = decode_exchange_page(json!([]), Some("123".into())).unwrap();
        assert!(page.next_cursor.is_none());
        let page = decode_exchange_page(json!([{"id": "a"}]), Some("123".into())).unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("123"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let c = HttpCredentials::Wallet {
            api_key: "key-value".into(),
            api_secret: "secret-value".into(),
        };
        let s = format!("{c:?}");
        assert!(!s.contains("key-value"));
        assert!(!s.contains("secret-value"));
    }
}
