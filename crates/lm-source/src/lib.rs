//! lm-source
//!
//! Paginated upstream sources and the [`Paginator`] that walks them.
//!
//! The core only sees "a paginated source of JSON documents"; transport,
//! signing and cursor extraction live behind [`PageSource`].

mod http;
mod paginator;
pub mod signing;

pub use http::{CursorStyle, HttpCredentials, HttpSource};
pub use paginator::Paginator;

use std::fmt;

use serde_json::Value;

// ---------------------------------------------------------------------------
// Request / page
// ---------------------------------------------------------------------------

/// One page request against a collection endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Endpoint path relative to the source base URL (e.g. `/v2/accounts`).
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Opaque "continue after" token from the previous page.
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Documents of one page plus the cursor for the next one, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub documents: Vec<Value>,
    pub next_cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API answered with a non-success status.
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// Missing or invalid credentials / base URL.
    Config(String),
    /// Upstream handed back a cursor it had already issued.
    StuckCursor { cursor: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Api { status, message } => {
                write!(f, "upstream api error status={status}: {message}")
            }
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
            SourceError::Config(msg) => write!(f, "config error: {msg}"),
            SourceError::StuckCursor { cursor } => {
                write!(f, "pagination stuck: repeated cursor {cursor}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Upstream collection endpoint that serves one page per call.
///
/// Implementations never retry; a failure is returned to the caller as is.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Human-readable name used in logs (e.g. `"wallet"`).
    fn name(&self) -> &str;

    async fn fetch_page(&self, req: &PageRequest) -> Result<Page, SourceError>;
}
