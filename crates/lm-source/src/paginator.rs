use std::collections::HashSet;

use serde_json::Value;

use crate::{Page, PageRequest, PageSource, SourceError};

/// Walks a cursor-paginated collection from the beginning to its end.
///
/// Lazy: one network round-trip per [`Paginator::next_page`]. Finite: stops
/// when a page carries no cursor, and refuses a cursor it has already
/// followed. Not resumable; a fresh paginator always starts at page one.
pub struct Paginator<'a, S: PageSource + ?Sized> {
    source: &'a S,
    request: PageRequest,
    seen: HashSet<String>,
    done: bool,
    pages: usize,
}

impl<'a, S: PageSource + ?Sized> Paginator<'a, S> {
    pub fn new(source: &'a S, mut request: PageRequest) -> Self {
        request.cursor = None;
        Self {
            source,
            request,
            seen: HashSet::new(),
            done: false,
            pages: 0,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Cursor the next request will carry, if any.
    pub fn cursor(&self) -> Option<&str> {
        self.request.cursor.as_deref()
    }

    pub async fn next_page(&mut self) -> Result<Option<Page>, SourceError> {
        if self.done {
            return Ok(None);
        }

        let page = match self.source.fetch_page(&self.request).await {
            Ok(p) => p,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };
        self.pages += 1;

        match page.next_cursor.as_deref().filter(|c| !c.is_empty()) {
            Some(cursor) => {
                if !self.seen.insert(cursor.to_string()) {
                    self.done = true;
                    return Err(SourceError::StuckCursor {
                        cursor: cursor.to_string(),
                    });
                }
                tracing::debug!(
                    source = self.source.name(),
                    path = %self.request.path,
                    page = self.pages,
                    documents = page.documents.len(),
                    cursor,
                    "page fetched, continuing"
                );
                self.request.cursor = Some(cursor.to_string());
            }
            None => {
                tracing::debug!(
                    source = self.source.name(),
                    path = %self.request.path,
                    page = self.pages,
                    documents = page.documents.len(),
                    "last page fetched"
                );
                self.done = true;
            }
        }

        Ok(Some(page))
    }

    /// Drain every page into one document list.
    pub async fn collect_all(mut self) -> Result<Vec<Value>, SourceError> {
        let mut out = Vec::new();
        while let Some(page) = self.next_page().await? {
            out.extend(page.documents);
        }
        Ok(out)
    }
}
