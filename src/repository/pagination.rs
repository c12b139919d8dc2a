//! Generic cursor pagination. The API sometimes re-serves the last page of a
//! timeline instead of signalling the end, so two stall checks run on every
//! page: a repeated cursor and a page that adds nothing unseen.

use crate::domain::model::{CursorPage, Paginated, PaginateOptions};
use crate::error::*;
use indexmap::IndexMap;
use std::future::Future;

pub async fn paginate_cursor<T, K, F, Fut>(
    opts: PaginateOptions,
    get_key: K,
    mut fetch_page: F,
) -> Result<Paginated<T>>
where
    K: Fn(&T) -> String,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>>>,
{
    // first-seen wins, later duplicates neither move nor replace an item
    let mut accumulated: IndexMap<String, T> = IndexMap::new();
    let mut cursor = opts.cursor.clone();
    let mut pages_fetched = 0usize;

    if opts.max_pages == Some(0) {
        return Ok(Paginated {
            items: Vec::new(),
            next_cursor: cursor,
            partial_error: None,
        });
    }

    loop {
        if pages_fetched > 0 && !opts.page_delay.is_zero() {
            tokio::time::sleep(opts.page_delay).await;
        }

        let page = match fetch_page(cursor.clone()).await {
            Ok(page) => page,
            Err(e) => {
                if accumulated.is_empty() {
                    return Err(e);
                }
                // pages already landed: hand them over with the cursor that
                // failed, so the caller can resume instead of starting over
                log::warn!(
                    "page {} failed, returning {} items fetched so far: {}",
                    pages_fetched + 1,
                    accumulated.len(),
                    e.describe()
                );
                return Ok(Paginated {
                    items: accumulated.into_values().collect(),
                    next_cursor: cursor,
                    partial_error: Some(e.describe()),
                });
            }
        };
        pages_fetched += 1;

        let mut new_items = 0usize;
        for item in page.items {
            let key = get_key(&item);
            if !accumulated.contains_key(&key) {
                accumulated.insert(key, item);
                new_items += 1;
            }
        }
        log::debug!(
            "page {pages_fetched}: {} new items, cursor {:?}",
            new_items,
            page.next_cursor
        );

        let cursor_stalled = match (&page.next_cursor, &cursor) {
            (None, _) => true,
            (Some(next), Some(current)) => next == current,
            (Some(_), None) => false,
        };
        if cursor_stalled || new_items == 0 {
            return Ok(Paginated {
                items: accumulated.into_values().collect(),
                next_cursor: None,
                partial_error: None,
            });
        }

        if let Some(max) = opts.max_pages {
            if pages_fetched >= max {
                return Ok(Paginated {
                    items: accumulated.into_values().collect(),
                    next_cursor: page.next_cursor,
                    partial_error: None,
                });
            }
        }

        cursor = page.next_cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str);

    fn opts(max_pages: Option<usize>) -> PaginateOptions {
        PaginateOptions {
            cursor: None,
            max_pages,
            page_delay: Duration::ZERO,
        }
    }

    /// scripted page source; pops one result per call
    fn scripted(
        pages: Vec<Result<CursorPage<Item>>>,
    ) -> impl FnMut(Option<String>) -> std::future::Ready<Result<CursorPage<Item>>> {
        let remaining = Mutex::new(pages);
        move |_cursor| {
            let mut remaining = remaining.lock().unwrap();
            assert!(!remaining.is_empty(), "fetched more pages than scripted");
            std::future::ready(remaining.remove(0))
        }
    }

    fn page(items: Vec<Item>, next_cursor: Option<&str>) -> Result<CursorPage<Item>> {
        Ok(CursorPage {
            items,
            next_cursor: next_cursor.map(String::from),
        })
    }

    fn failure() -> Result<CursorPage<Item>> {
        Err(ServiceError::new(
            ApiError::Transport,
            anyhow::anyhow!("connection reset"),
        ))
    }

    #[tokio::test]
    async fn it_should_finish_on_a_single_page_without_cursor() {
        let result = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![page(vec![Item("a")], None)]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("a")]);
        assert_eq!(result.next_cursor, None);
        assert_eq!(result.partial_error, None);
    }

    #[tokio::test]
    async fn it_should_deduplicate_and_keep_first_seen_order() {
        let result = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![
                page(vec![Item("a"), Item("b")], Some("p2")),
                page(vec![Item("b"), Item("c")], None),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("a"), Item("b"), Item("c")]);
        assert_eq!(result.next_cursor, None);
    }

    #[tokio::test]
    async fn it_should_stop_when_a_page_adds_nothing_new() {
        // page 2 re-serves "dup" under a fresh cursor; that alone must stop
        // the walk, with no cursor reported
        let result = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![
                page(vec![Item("dup")], Some("p2")),
                page(vec![Item("dup")], Some("p3")),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("dup")]);
        assert_eq!(result.next_cursor, None);
    }

    #[tokio::test]
    async fn it_should_stop_when_the_cursor_repeats() {
        let result = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![
                page(vec![Item("a")], Some("p2")),
                page(vec![Item("b")], Some("p2")),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("a"), Item("b")]);
        assert_eq!(result.next_cursor, None);
    }

    #[tokio::test]
    async fn it_should_honor_the_page_limit_and_report_the_resumption_cursor() {
        let result = paginate_cursor(
            opts(Some(2)),
            |item: &Item| item.0.to_string(),
            scripted(vec![
                page(vec![Item("a")], Some("p2")),
                page(vec![Item("b")], Some("p3")),
                // a third page exists but must never be fetched
                page(vec![Item("c")], None),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("a"), Item("b")]);
        assert_eq!(result.next_cursor, Some("p3".to_string()));
    }

    #[tokio::test]
    async fn it_should_surface_partial_progress_when_a_later_page_fails() {
        let result = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![page(vec![Item("a")], Some("p2")), failure()]),
        )
        .await
        .unwrap();

        assert_eq!(result.items, vec![Item("a")]);
        assert_eq!(result.next_cursor, Some("p2".to_string()));
        let partial = result.partial_error.unwrap();
        assert!(partial.contains("transport_error"));
    }

    #[tokio::test]
    async fn it_should_propagate_a_failure_on_the_first_page() {
        let err = paginate_cursor(
            opts(None),
            |item: &Item| item.0.to_string(),
            scripted(vec![failure()]),
        )
        .await
        .unwrap_err();

        assert!(err.is_error_of(ApiError::Transport));
    }

    #[tokio::test]
    async fn it_should_resume_from_a_caller_supplied_cursor() {
        let seen = Mutex::new(Vec::new());
        let result = paginate_cursor(
            PaginateOptions {
                cursor: Some("resume".to_string()),
                max_pages: Some(1),
                page_delay: Duration::ZERO,
            },
            |item: &Item| item.0.to_string(),
            |cursor| {
                seen.lock().unwrap().push(cursor.clone());
                std::future::ready(page(vec![Item("a")], Some("next")))
            },
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some("resume".to_string())]);
        assert_eq!(result.next_cursor, Some("next".to_string()));
    }

    #[tokio::test]
    async fn it_should_fetch_nothing_for_a_zero_page_limit() {
        let result = paginate_cursor(
            opts(Some(0)),
            |item: &Item| item.0.to_string(),
            scripted(vec![]),
        )
        .await
        .unwrap();

        assert!(result.items.is_empty());
    }
}
