//! lm-testkit
//!
//! Offline stand-ins for the upstream APIs: a [`ScriptedSource`] that serves
//! pre-baked pages through the real [`PageSource`] seam, and canned
//! documents shaped like the wallet and exchange payloads.

pub mod docs;

use std::collections::BTreeMap;
use std::sync::Mutex;

use lm_source::{Page, PageRequest, PageSource, SourceError};
use serde_json::Value;

enum Route {
    Pages(Vec<Vec<Value>>),
    /// Serves `pages`, then fails the request that would fetch the next one.
    FailAfter {
        pages: Vec<Vec<Value>>,
        error: SourceError,
    },
    /// Every page hands back the same cursor.
    Stuck(Vec<Value>),
}

/// Page source answering from a per-path script.
///
/// Cursors are the index of the next page as a string, so a walk over three
/// scripted pages sees `None`, `"1"`, `"2"`. Unknown paths answer with one
/// empty page. Every request is logged, query included.
pub struct ScriptedSource {
    name: String,
    routes: BTreeMap<String, Route>,
    log: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: BTreeMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Script `path` as consecutive pages.
    pub fn with_pages(mut self, path: impl Into<String>, pages: Vec<Vec<Value>>) -> Self {
        self.routes.insert(path.into(), Route::Pages(pages));
        self
    }

    /// Script `path` as a single page.
    pub fn with_page(self, path: impl Into<String>, documents: Vec<Value>) -> Self {
        self.with_pages(path, vec![documents])
    }

    /// Serve `pages`, then answer the next request with `error`.
    pub fn with_failure_after(
        mut self,
        path: impl Into<String>,
        pages: Vec<Vec<Value>>,
        error: SourceError,
    ) -> Self {
        self.routes
            .insert(path.into(), Route::FailAfter { pages, error });
        self
    }

    /// A collection whose upstream keeps returning the same cursor.
    pub fn with_stuck_cursor(mut self, path: impl Into<String>, documents: Vec<Value>) -> Self {
        self.routes.insert(path.into(), Route::Stuck(documents));
        self
    }

    /// Every request served so far, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Paths requested so far, in order, duplicates kept.
    pub fn requested_paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    fn record(&self, req: &PageRequest) {
        match self.log.lock() {
            Ok(mut log) => log.push(req.clone()),
            Err(poisoned) => poisoned.into_inner().push(req.clone()),
        }
    }
}

fn page_index(req: &PageRequest) -> Result<usize, SourceError> {
    match &req.cursor {
        None => Ok(0),
        Some(c) => c
            .parse::<usize>()
            .map_err(|_| SourceError::Decode(format!("scripted source: bad cursor {c:?}"))),
    }
}

fn serve(pages: &[Vec<Value>], idx: usize) -> Page {
    let documents = pages.get(idx).cloned().unwrap_or_default();
    let next_cursor = if idx + 1 < pages.len() {
        Some((idx + 1).to_string())
    } else {
        None
    };
    Page {
        documents,
        next_cursor,
    }
}

#[async_trait::async_trait]
impl PageSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, req: &PageRequest) -> Result<Page, SourceError> {
        self.record(req);
        let idx = page_index(req)?;
        match self.routes.get(&req.path) {
            None => Ok(Page::default()),
            Some(Route::Pages(pages)) => Ok(serve(pages, idx)),
            Some(Route::FailAfter { pages, error }) => {
                if idx < pages.len() {
                    let mut page = serve(pages, idx);
                    // The failing request must still be reached.
                    page.next_cursor = Some((idx + 1).to_string());
                    Ok(page)
                } else {
                    Err(error.clone())
                }
            }
            Some(Route::Stuck(documents)) => Ok(Page {
                documents: documents.clone(),
                next_cursor: Some("1".to_string()),
            }),
        }
    }
}
