//! Bounded page-by-page collection for vendor list endpoints.

use std::future::Future;

use tracing::debug;

/// What the collector asks the vendor for next.
///
/// Offset-paged APIs read `offset`; token-paged APIs read `token`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub size: usize,
    pub offset: usize,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Vendor continuation marker; `None` means this was the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    /// Continuation marker of the last page fetched, if the vendor had more.
    pub next: Option<String>,
}

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

pub async fn collect<T, E, F, Fut>(
    limit: usize,
    max_page_size: usize,
    fetch_page: F,
) -> Result<Collected<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    collect_pages(limit, max_page_size, fetch_page, |_| true, true).await
}

/// Collects up to `limit` items that satisfy `keep`.
///
/// Every request asks for `max_page_size` items, since the filter may discard
/// any of them; kept items past `limit` are dropped. The offset advances by
/// what the vendor returned, kept or not.
pub async fn collect_where<T, E, F, Fut, P>(
    limit: usize,
    max_page_size: usize,
    fetch_page: F,
    keep: P,
) -> Result<Collected<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    P: Fn(&T) -> bool,
{
    collect_pages(limit, max_page_size, fetch_page, keep, false).await
}

/// With `shrink_to_remaining`, page sizes never exceed the number of items
/// still wanted.
async fn collect_pages<T, E, F, Fut, P>(
    limit: usize,
    max_page_size: usize,
    mut fetch_page: F,
    keep: P,
    shrink_to_remaining: bool,
) -> Result<Collected<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    P: Fn(&T) -> bool,
{
    let mut collected = Collected::default();
    if limit == 0 || max_page_size == 0 {
        return Ok(collected);
    }

    let mut offset = 0;
    let mut token: Option<String> = None;

    while collected.items.len() < limit {
        let size = if shrink_to_remaining {
            max_page_size.min(limit - collected.items.len())
        } else {
            max_page_size
        };
        let page = fetch_page(PageRequest {
            size,
            offset,
            token: token.take(),
        })
        .await?;

        if page.items.is_empty() {
            debug!(offset, "empty page, stopping");
            collected.next = None;
            break;
        }

        offset += page.items.len();
        for item in page.items {
            if collected.items.len() == limit {
                break;
            }
            if keep(&item) {
                collected.items.push(item);
            }
        }

        collected.next = page.next.clone();
        match page.next {
            Some(next) => token = Some(next),
            None => {
                debug!(offset, "vendor reported no further pages");
                break;
            }
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Offset-paged fake vendor over `0..total`.
    fn numbers(
        total: usize,
        max_page_size: usize,
        requests: &RefCell<Vec<PageRequest>>,
    ) -> impl FnMut(PageRequest) -> std::future::Ready<Result<Page<usize>, String>> + '_ {
        move |request: PageRequest| {
            requests.borrow_mut().push(request.clone());
            let end = total.min(request.offset + request.size.min(max_page_size));
            let items = (request.offset.min(end)..end).collect::<Vec<_>>();
            let next = (end < total).then(|| format!("after-{end}"));
            std::future::ready(Ok(Page::new(items, next)))
        }
    }

    #[tokio::test]
    async fn zero_limit_issues_no_request() {
        let requests = RefCell::new(Vec::new());
        let collected = collect(0, 50, numbers(10, 50, &requests))
            .await
            .expect("collects");
        assert!(collected.items.is_empty());
        assert!(requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn page_sizes_respect_vendor_maximum_and_remaining() {
        let requests = RefCell::new(Vec::new());
        let collected = collect(120, 50, numbers(1000, 50, &requests))
            .await
            .expect("collects");

        assert_eq!(collected.items, (0..120).collect::<Vec<_>>());
        let sizes = requests.borrow().iter().map(|r| r.size).collect::<Vec<_>>();
        assert_eq!(sizes, vec![50, 50, 20]);
        let offsets = requests.borrow().iter().map(|r| r.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 50, 100]);
        assert_eq!(collected.next.as_deref(), Some("after-120"));
    }

    #[tokio::test]
    async fn stops_when_vendor_runs_out() {
        let requests = RefCell::new(Vec::new());
        let collected = collect(500, 50, numbers(70, 50, &requests))
            .await
            .expect("collects");

        assert_eq!(collected.items.len(), 70);
        assert_eq!(requests.borrow().len(), 2);
        assert_eq!(collected.next, None);
    }

    #[tokio::test]
    async fn continuation_token_is_passed_to_next_request() {
        let requests = RefCell::new(Vec::new());
        collect(100, 40, numbers(100, 40, &requests))
            .await
            .expect("collects");

        let tokens = requests
            .borrow()
            .iter()
            .map(|r| r.token.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            tokens,
            vec![None, Some("after-40".to_string()), Some("after-80".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_page_stops_even_with_next_marker() {
        let mut calls = 0;
        let collected = collect(10, 5, |_request| {
            calls += 1;
            std::future::ready(Ok::<_, String>(Page::<u8>::new(
                Vec::new(),
                Some("more".to_string()),
            )))
        })
        .await
        .expect("collects");

        assert!(collected.items.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn oversized_vendor_page_is_truncated_to_limit() {
        let collected = collect(3, 50, |_request| {
            std::future::ready(Ok::<_, String>(Page::new(
                (0..10).collect::<Vec<u8>>(),
                Some("more".to_string()),
            )))
        })
        .await
        .expect("collects");

        assert_eq!(collected.items, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn filter_counts_kept_items_and_advances_by_raw_page() {
        let requests = RefCell::new(Vec::new());
        let collected = collect_where(5, 4, numbers(100, 4, &requests), |n| n % 2 == 0)
            .await
            .expect("collects");

        assert_eq!(collected.items, vec![0, 2, 4, 6, 8]);
        let offsets = requests.borrow().iter().map(|r| r.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 4, 8]);
    }

    #[tokio::test]
    async fn narrow_filter_keeps_full_page_sizes() {
        let requests = RefCell::new(Vec::new());
        let collected = collect_where(1, 50, numbers(300, 50, &requests), |n| *n == 299)
            .await
            .expect("collects");

        assert_eq!(collected.items, vec![299]);
        let sizes = requests.borrow().iter().map(|r| r.size).collect::<Vec<_>>();
        assert_eq!(sizes, vec![50; 6]);
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let err = collect(10, 5, |_request| {
            std::future::ready(Err::<Page<u8>, _>("boom".to_string()))
        })
        .await
        .expect_err("fails");
        assert_eq!(err, "boom");
    }
}
