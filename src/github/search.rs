//! The search API seam and the paginated fetch built on top of it.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::SearchError;
use crate::types::{RateLimitInfo, RemoteItem, SearchScope};

/// GitHub never returns more than this many results for one search.
pub const MAX_SEARCH_RESULTS: u32 = 1000;
/// Largest page size the search endpoints accept.
pub const MAX_PER_PAGE: u32 = 100;

/// Opaque position of the next page, as advertised by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(pub u32);

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<RemoteItem>,
    /// `None` on the last page.
    pub next: Option<PageCursor>,
    pub total_count: u64,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Executes one page of a search query.
///
/// With `force` set, an implementation that caches pages must go to the
/// server.
///
/// Implemented by [`GitHubSearchApi`](crate::github::GitHubSearchApi) and by
/// the scripted [`StubSearchApi`](crate::engine::stub::StubSearchApi).
pub trait SearchApi: Send + Sync + 'static {
    fn fetch_page(
        &self,
        scope: SearchScope,
        query: &str,
        cursor: Option<PageCursor>,
        per_page: u32,
        force: bool,
    ) -> impl Future<Output = Result<SearchPage, SearchError>> + Send;
}

/// Per poll cycle bounds on a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub per_page: u32,
    pub max_items: u32,
}

impl FetchLimits {
    /// Clamp to what the search API supports.
    pub fn clamped(self) -> Self {
        Self {
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
            max_items: self.max_items.clamp(1, MAX_SEARCH_RESULTS),
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            per_page: MAX_PER_PAGE,
            max_items: MAX_SEARCH_RESULTS,
        }
    }
}

/// Retries of transient page failures within one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,
    /// Delay before the first retry, doubled for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: Self = Self {
        attempts: 0,
        base_delay: Duration::ZERO,
    };

    fn delay(self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Items gathered by [`execute_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResults {
    pub items: Vec<RemoteItem>,
    /// Stopped at `max_items` while the server still had more.
    pub truncated: bool,
}

/// Fetch every page of `query` up to `limits.max_items` items.
///
/// Transient failures of a single page are retried according to `retry`;
/// any other error, or a page still failing after the last retry, aborts the
/// whole fetch and nothing gathered so far is returned. `force` is passed to
/// every page request.
pub async fn execute_all<A: SearchApi>(
    api: &A,
    scope: SearchScope,
    query: &str,
    limits: FetchLimits,
    retry: RetryPolicy,
    force: bool,
) -> Result<FetchedResults, SearchError> {
    let limits = limits.clamped();
    let max = limits.max_items as usize;
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch_with_retry(api, scope, query, cursor, limits.per_page, retry, force).await?;
        let page_len = page.items.len();
        items.extend(page.items);

        if items.len() >= max {
            let more = items.len() > max || page.next.is_some();
            items.truncate(max);
            return Ok(FetchedResults {
                items,
                truncated: more,
            });
        }
        match page.next {
            // An empty page with a next link would loop forever.
            Some(next) if page_len > 0 => cursor = Some(next),
            _ => {
                return Ok(FetchedResults {
                    items,
                    truncated: false,
                });
            }
        }
    }
}

async fn fetch_with_retry<A: SearchApi>(
    api: &A,
    scope: SearchScope,
    query: &str,
    cursor: Option<PageCursor>,
    per_page: u32,
    retry: RetryPolicy,
    force: bool,
) -> Result<SearchPage, SearchError> {
    let mut attempt = 0;
    loop {
        match api.fetch_page(scope, query, cursor, per_page, force).await {
            Ok(page) => {
                if let Some(rl) = &page.rate_limit {
                    debug!(
                        remaining = rl.remaining,
                        limit = rl.limit,
                        "search rate limit"
                    );
                }
                return Ok(page);
            }
            Err(e) if e.is_transient() && attempt < retry.attempts => {
                let delay = retry.delay(attempt);
                warn!(query, attempt, ?delay, "transient search failure, retrying: {e}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
