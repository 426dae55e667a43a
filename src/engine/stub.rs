use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::SearchError;
use crate::github::{PageCursor, SearchApi, SearchPage};
use crate::types::{RemoteItem, SearchScope};

type Outcome = Result<Vec<RemoteItem>, SearchError>;

#[derive(Default)]
struct Script {
    /// Consumed one per call, each after an optional delay.
    queued: VecDeque<(Duration, Outcome)>,
    /// Served once the queue is empty.
    fallback: Option<Outcome>,
    calls: usize,
    forced: usize,
    in_flight: usize,
    peak_in_flight: usize,
}

/// A search backend serving scripted fixtures without any network calls.
///
/// Responses are keyed by query string and always fit in a single page.
/// A query with nothing scripted returns no items.
///
/// Useful for engine tests and demos that must not require a `GITHUB_TOKEN`.
#[derive(Default)]
pub struct StubSearchApi {
    scripts: Mutex<HashMap<String, Script>>,
    in_flight: Mutex<(usize, usize)>,
}

/// Counts one request as in flight until dropped, including when the
/// request is cancelled mid-delay.
struct InFlight<'a> {
    api: &'a StubSearchApi,
    query: &'a str,
}

impl<'a> InFlight<'a> {
    fn enter(api: &'a StubSearchApi, query: &'a str) -> Self {
        {
            let mut total = api.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            total.0 += 1;
            total.1 = total.1.max(total.0);
        }
        api.with_script(query, |s| {
            s.in_flight += 1;
            s.peak_in_flight = s.peak_in_flight.max(s.in_flight);
        });
        Self { api, query }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.api
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0 -= 1;
        self.api.with_script(self.query, |s| s.in_flight -= 1);
    }
}

impl StubSearchApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<R>(&self, query: &str, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        f(scripts.entry(query.to_owned()).or_default())
    }

    /// Serve `outcome` for `query` whenever nothing is queued.
    pub fn set_fallback(&self, query: &str, outcome: Outcome) {
        self.with_script(query, |s| s.fallback = Some(outcome));
    }

    /// Serve `outcome` for the next unscripted call on `query`.
    pub fn push(&self, query: &str, outcome: Outcome) {
        self.push_delayed(query, Duration::ZERO, outcome);
    }

    /// Like [`push`](Self::push), answering only after `delay`.
    pub fn push_delayed(&self, query: &str, delay: Duration, outcome: Outcome) {
        self.with_script(query, |s| s.queued.push_back((delay, outcome)));
    }

    /// Number of pages requested for `query` so far.
    pub fn calls(&self, query: &str) -> usize {
        self.with_script(query, |s| s.calls)
    }

    /// Number of those requests made with `force` set.
    pub fn forced_calls(&self, query: &str) -> usize {
        self.with_script(query, |s| s.forced)
    }

    /// Most requests for `query` ever in flight at once.
    pub fn peak_in_flight(&self, query: &str) -> usize {
        self.with_script(query, |s| s.peak_in_flight)
    }

    /// Most requests ever in flight at once, across all queries.
    pub fn peak_in_flight_total(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1
    }
}

impl SearchApi for StubSearchApi {
    async fn fetch_page(
        &self,
        _scope: SearchScope,
        query: &str,
        _cursor: Option<PageCursor>,
        _per_page: u32,
        force: bool,
    ) -> Result<SearchPage, SearchError> {
        let _in_flight = InFlight::enter(self, query);
        let (delay, outcome) = self.with_script(query, |s| {
            s.calls += 1;
            if force {
                s.forced += 1;
            }
            s.queued.pop_front().unwrap_or_else(|| {
                (
                    Duration::ZERO,
                    s.fallback.clone().unwrap_or_else(|| Ok(Vec::new())),
                )
            })
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let items = outcome?;
        Ok(SearchPage {
            total_count: items.len() as u64,
            items,
            next: None,
            rate_limit: None,
        })
    }
}
