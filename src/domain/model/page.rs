use serde::*;
use std::time::Duration;

/// one fetched page: items plus the cursor for the page after it
#[derive(Debug, Clone)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// the paginator's result
///
/// `partial_error` is set when at least one page landed but a later page
/// failed; `next_cursor` then points at the last page that was requested so
/// the caller can resume.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaginateOptions {
    /// starting cursor, for resuming a prior run
    pub cursor: Option<String>,
    pub max_pages: Option<usize>,
    /// courtesy wait between page fetches
    pub page_delay: Duration,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        PaginateOptions {
            cursor: None,
            max_pages: None,
            page_delay: Duration::from_millis(300),
        }
    }
}

impl PaginateOptions {
    pub fn single_page() -> Self {
        PaginateOptions {
            max_pages: Some(1),
            ..Default::default()
        }
    }
}
