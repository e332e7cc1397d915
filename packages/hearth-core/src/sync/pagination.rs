//! # Pagination Cursor
//!
//! One cursor per list. It hands out row windows and decides, from what came
//! back, whether another page is worth asking for.
//!
//! ```text
//!   begin(Replace) ──► page 0 ──► complete(rows) ──► has_more?
//!   begin(Append)  ──► page n+1 ─┘
//!
//!   Heuristic: has_more = rows.len() >= page_size
//!              (a last page of exactly page_size rows reports more; the
//!               following empty page flips it off)
//!   Exact:     request page_size + 1, has_more = rows.len() > page_size,
//!              extra row dropped
//! ```

use serde::{Deserialize, Serialize};

/// How "has more" is decided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasMorePolicy {
    /// A full page means there may be more. Approximate, one request per page.
    #[default]
    Heuristic,
    /// Ask for one extra row to know for sure
    Exact,
}

/// Whether a load restarts the list or extends it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Load page 0 and replace the list
    Replace,
    /// Load the page after the last one loaded
    Append,
}

/// Row window for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page index being fetched
    pub page: usize,
    /// First row
    pub offset: usize,
    /// Rows to request
    pub limit: usize,
    /// Mode this request was issued for
    pub mode: FetchMode,
}

/// Pagination state of one list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    page: usize,
    page_size: usize,
    has_more: bool,
    term: Option<String>,
    policy: HasMorePolicy,
}

impl Cursor {
    /// Create a cursor positioned before page 0
    pub fn new(page_size: usize, policy: HasMorePolicy) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
            has_more: false,
            term: None,
            policy,
        }
    }

    /// Last page loaded
    pub fn page(&self) -> usize {
        self.page
    }

    /// Rows per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Whether another page may exist
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Active search term
    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    /// Set (or clear) the search term. Blank terms clear it.
    pub fn set_term(&mut self, term: Option<&str>) {
        self.term = term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
    }

    /// Whether this request is an unfiltered first page, the only shape
    /// that is mirrored in the cache
    pub fn is_cacheable(&self, request: &PageRequest) -> bool {
        request.page == 0 && self.term.is_none()
    }

    /// Window for the next fetch
    pub fn begin(&self, mode: FetchMode) -> PageRequest {
        let page = match mode {
            FetchMode::Replace => 0,
            FetchMode::Append => self.page + 1,
        };
        let limit = match self.policy {
            HasMorePolicy::Heuristic => self.page_size,
            HasMorePolicy::Exact => self.page_size + 1,
        };
        PageRequest {
            page,
            offset: page * self.page_size,
            limit,
            mode,
        }
    }

    /// Record the result of `request`, trimming the extra look-ahead row under the
    /// exact policy
    pub fn complete<T>(&mut self, request: &PageRequest, rows: &mut Vec<T>) {
        self.page = request.page;
        self.has_more = match self.policy {
            HasMorePolicy::Heuristic => rows.len() >= self.page_size,
            HasMorePolicy::Exact => {
                let more = rows.len() > self.page_size;
                rows.truncate(self.page_size);
                more
            }
        };
    }

    /// Back to page 0, no more data known, no search term
    pub fn reset(&mut self) {
        self.page = 0;
        self.has_more = false;
        self.term = None;
    }
}
