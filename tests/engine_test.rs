use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gh_searches::cache::ResultCache;
use gh_searches::engine::{
    Engine, EngineHandle, Event, PollScheduler, PollSettings, Request, StubSearchApi,
};
use gh_searches::error::SearchError;
use gh_searches::github::{
    FetchLimits, GitHubSearchApi, RetryPolicy, SearchApi, StaticToken, install_crypto_provider,
};
use gh_searches::types::{
    BuiltinId, ItemDetail, ItemKind, ItemState, PollPhase, QueryId, Reactions, RemoteItem,
    SavedQuery, SearchScope,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn item(id: &str, minutes_ago: i64) -> RemoteItem {
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    RemoteItem {
        id: id.to_owned(),
        kind: ItemKind::Issue,
        title: format!("Issue {id}"),
        url: format!("https://github.com/acme/widgets/issues/{id}"),
        updated_at: base - TimeDelta::minutes(minutes_ago),
        state: Some(ItemState::Open),
        detail: ItemDetail::Issue {
            repo: Some("acme/widgets".into()),
            number: 1,
            author: None,
            reactions: Reactions::default(),
        },
    }
}

fn custom(n: u64, title: &str, query: &str) -> SavedQuery {
    SavedQuery {
        id: QueryId::Custom(n),
        title: title.to_owned(),
        query: query.to_owned(),
        scope: SearchScope::Issues,
    }
}

fn settings() -> PollSettings {
    PollSettings {
        // Long enough that no scheduled poll fires during a test.
        interval: Duration::from_secs(600),
        max_interval: Duration::from_secs(3600),
        max_concurrent: 4,
        limits: FetchLimits::default(),
        retry: RetryPolicy::NONE,
    }
}

fn start(api: &Arc<StubSearchApi>, cache: &ResultCache) -> (EngineHandle, Receiver<Event>) {
    start_with(Arc::clone(api), cache, settings())
}

fn start_with<A: SearchApi>(
    api: Arc<A>,
    cache: &ResultCache,
    settings: PollSettings,
) -> (EngineHandle, Receiver<Event>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = PollScheduler::new(api, cache.clone(), settings)
        .with_events(tx)
        .start();
    (handle, rx)
}

/// Receive events until one matches, panicking on timeout.
fn wait_for(rx: &Receiver<Event>, mut pred: impl FnMut(&Event) -> bool) -> Event {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = rx
            .recv_timeout(left)
            .expect("engine should emit the expected event");
        if pred(&event) {
            return event;
        }
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn initial_sync_polls_every_query() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("q1", Ok(vec![item("a", 5), item("b", 1)]));
    api.set_fallback("q2", Ok(vec![item("c", 3)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);

    let (q1, q2) = (custom(1, "One", "q1"), custom(2, "Two", "q2"));
    engine.send(Request::SyncQueries {
        queries: vec![q1.clone(), q2.clone()],
    });

    let mut updated = Vec::new();
    while updated.len() < 2 {
        if let Event::ResultsUpdated { query_id, .. } =
            wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }))
        {
            updated.push(query_id);
        }
    }
    updated.sort();
    assert_eq!(updated, [q1.id, q2.id]);

    let ids: Vec<_> = cache
        .snapshot(q1.id)
        .unwrap()
        .items
        .iter()
        .map(|i| i.id.clone())
        .collect();
    assert_eq!(ids, ["b", "a"]);
    assert_eq!(cache.poll_state(q2.id).unwrap().phase, PollPhase::Idle);

    engine.send(Request::Shutdown);
}

#[test]
fn query_deleted_mid_poll_never_reappears() {
    let api = Arc::new(StubSearchApi::new());
    let assigned = SavedQuery {
        id: QueryId::Builtin(BuiltinId::AssignedIssues),
        title: "Assigned issues".into(),
        query: "assignee:@me is:open".into(),
        scope: SearchScope::Issues,
    };
    api.push(
        &assigned.query,
        Ok(vec![item("a", 1), item("b", 2), item("c", 3)]),
    );
    api.push_delayed(
        &assigned.query,
        Duration::from_millis(300),
        Ok(vec![item("a", 0), item("b", 2), item("c", 3), item("d", 4)]),
    );
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);

    engine.send(Request::SyncQueries {
        queries: vec![assigned.clone()],
    });
    let event = wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(
        event,
        Event::ResultsUpdated {
            query_id: assigned.id,
            count: 3,
            truncated: false
        }
    );

    // Start the slow second poll, then delete the query while it is in flight.
    engine.send(Request::RefreshNow { id: assigned.id });
    wait_until(|| api.calls(&assigned.query) >= 2);
    engine.send(Request::SyncQueries { queries: vec![] });

    // Give the in-flight request ample time to complete.
    std::thread::sleep(Duration::from_millis(600));
    assert!(cache.snapshot(assigned.id).is_none());
    assert!(cache.poll_state(assigned.id).is_none());
    assert!(!cache.ids().contains(&assigned.id));
    assert!(
        rx.try_iter().all(|e| e.query_id() != assigned.id),
        "a deleted query must not report results"
    );

    engine.send(Request::Shutdown);
}

#[test]
fn failed_poll_keeps_previous_results() {
    let api = Arc::new(StubSearchApi::new());
    api.push("q", Ok(vec![item("a", 1), item("b", 2), item("c", 3)]));
    api.set_fallback("q", Err(SearchError::Transient("502 Bad Gateway".into())));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let q = custom(1, "Q", "q");

    engine.send(Request::SyncQueries {
        queries: vec![q.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    let before = cache.snapshot(q.id).unwrap();

    engine.send(Request::RefreshNow { id: q.id });
    let event = wait_for(&rx, |e| matches!(e, Event::PollFailed { .. }));
    let Event::PollFailed { retry_in, .. } = event else {
        unreachable!()
    };
    // First failure doubles the base interval.
    assert_eq!(retry_in, Duration::from_secs(1200));

    let after = cache.snapshot(q.id).unwrap();
    assert_eq!(after.items, before.items);
    assert!(Arc::ptr_eq(&before, &after));
    let state = cache.poll_state(q.id).unwrap();
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.is_stale());
    assert!(matches!(state.phase, PollPhase::Backoff { .. }));

    engine.send(Request::Shutdown);
}

#[test]
fn failing_query_does_not_affect_others() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("bad", Err(SearchError::Transient("timeout".into())));
    api.set_fallback("good", Ok(vec![item("a", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let (bad, good) = (custom(1, "Bad", "bad"), custom(2, "Good", "good"));

    engine.send(Request::SyncQueries {
        queries: vec![bad.clone(), good.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::PollFailed { query_id, .. } if *query_id == bad.id));
    wait_until(|| cache.snapshot(good.id).is_some());

    assert_eq!(cache.snapshot(good.id).unwrap().items.len(), 1);
    assert_eq!(cache.poll_state(good.id).unwrap().consecutive_failures, 0);
    assert!(cache.snapshot(bad.id).is_none());

    engine.send(Request::Shutdown);
}

#[test]
fn rate_limit_waits_at_least_retry_after() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback(
        "q",
        Err(SearchError::RateLimited {
            retry_after: Duration::from_secs(7200),
        }),
    );
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);

    engine.send(Request::SyncQueries {
        queries: vec![custom(1, "Q", "q")],
    });
    let event = wait_for(&rx, |e| matches!(e, Event::PollFailed { .. }));
    let Event::PollFailed { retry_in, .. } = event else {
        unreachable!()
    };
    assert_eq!(retry_in, Duration::from_secs(7200));

    engine.send(Request::Shutdown);
}

#[test]
fn auth_failure_pauses_until_credentials_change() {
    let api = Arc::new(StubSearchApi::new());
    api.push("q", Err(SearchError::Auth("Bad credentials".into())));
    api.set_fallback("q", Ok(vec![item("a", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let q = custom(1, "Q", "q");

    engine.send(Request::SyncQueries {
        queries: vec![q.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::PollPaused { .. }));
    assert!(matches!(
        cache.poll_state(q.id).unwrap().phase,
        PollPhase::Paused { .. }
    ));

    engine.send(Request::CredentialsChanged);
    let event = wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(event.query_id(), q.id);
    assert_eq!(cache.poll_state(q.id).unwrap().phase, PollPhase::Idle);

    engine.send(Request::Shutdown);
}

#[test]
fn invalid_query_is_restarted_when_edited() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("is:bogus", Err(SearchError::InvalidQuery("Validation Failed".into())));
    api.set_fallback("is:open", Ok(vec![item("a", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let broken = custom(1, "Q", "is:bogus");

    engine.send(Request::SyncQueries {
        queries: vec![broken.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::PollPaused { .. }));

    // Credentials are not the problem, so this must not resume it.
    engine.send(Request::CredentialsChanged);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(api.calls("is:bogus"), 1);

    let fixed = custom(1, "Q", "is:open");
    engine.send(Request::SyncQueries {
        queries: vec![fixed.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    let state = cache.poll_state(fixed.id).unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.last_error.is_none());

    engine.send(Request::Shutdown);
}

#[test]
fn title_only_change_does_not_restart_polling() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("q", Ok(vec![item("a", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);

    engine.send(Request::SyncQueries {
        queries: vec![custom(1, "Old", "q")],
    });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    let before = cache.snapshot(QueryId::Custom(1)).unwrap();

    engine.send(Request::SyncQueries {
        queries: vec![custom(1, "New", "q"), custom(2, "Other", "q")],
    });
    wait_for(&rx, |e| e.query_id() == QueryId::Custom(2));

    // Still the same result set, no second poll for the retitled query.
    let after = cache.snapshot(QueryId::Custom(1)).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(api.calls("q"), 2);

    engine.send(Request::Shutdown);
}

#[test]
fn refresh_all_polls_every_query_again() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("q1", Ok(vec![item("a", 1)]));
    api.set_fallback("q2", Ok(vec![item("b", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);

    engine.send(Request::SyncQueries {
        queries: vec![custom(1, "One", "q1"), custom(2, "Two", "q2")],
    });
    for _ in 0..2 {
        wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    }

    engine.send(Request::RefreshAll);
    for _ in 0..2 {
        wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    }
    assert_eq!(api.calls("q1"), 2);
    assert_eq!(api.calls("q2"), 2);

    engine.send(Request::Shutdown);
}

#[test]
fn refresh_now_bypasses_the_page_cache() {
    let api = Arc::new(StubSearchApi::new());
    api.set_fallback("q", Ok(vec![item("a", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let q = custom(1, "Q", "q");

    engine.send(Request::SyncQueries {
        queries: vec![q.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(api.forced_calls("q"), 0);

    engine.send(Request::RefreshNow { id: q.id });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(api.calls("q"), 2);
    assert_eq!(api.forced_calls("q"), 1);

    engine.send(Request::Shutdown);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_now_reaches_github_within_cache_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "incomplete_results": false,
            "items": [{
                "node_id": "I_1",
                "number": 1,
                "title": "Issue 1",
                "html_url": "https://github.com/acme/widgets/issues/1",
                "state": "open",
                "updated_at": "2025-01-02T10:00:00Z",
                "repository_url": "https://api.github.com/repos/acme/widgets",
                "user": { "login": "octocat" }
            }],
        })))
        .expect(2)
        .mount(&server)
        .await;

    install_crypto_provider();
    let api = GitHubSearchApi::new(
        server.uri(),
        Arc::new(StaticToken::new("test-token")),
        Duration::from_secs(30),
    );
    let cache = ResultCache::new(false);
    let (engine, rx) = start_with(Arc::new(api), &cache, settings());
    let q = custom(1, "Mine", "is:open author:@me");

    engine.send(Request::SyncQueries {
        queries: vec![q.clone()],
    });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    engine.send(Request::RefreshNow { id: q.id });
    wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));

    let received = server.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 2);
    engine.send(Request::Shutdown);
}

#[test]
fn concurrent_requests_are_capped() {
    let api = Arc::new(StubSearchApi::new());
    let queries: Vec<_> = (1..=6)
        .map(|n| custom(n, &format!("Q{n}"), &format!("q{n}")))
        .collect();
    for q in &queries {
        api.push_delayed(&q.query, Duration::from_millis(300), Ok(vec![item("a", 1)]));
    }
    let cache = ResultCache::new(false);
    let (engine, rx) = start_with(
        Arc::clone(&api),
        &cache,
        PollSettings {
            max_concurrent: 2,
            ..settings()
        },
    );

    let started = Instant::now();
    engine.send(Request::SyncQueries { queries });
    for _ in 0..6 {
        wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    }

    // Six 300ms requests, two at a time.
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(api.peak_in_flight_total(), 2);

    engine.send(Request::Shutdown);
}

#[test]
fn refreshes_during_a_poll_never_overlap_it() {
    let api = Arc::new(StubSearchApi::new());
    api.push_delayed("q", Duration::from_millis(300), Ok(vec![item("a", 1)]));
    api.set_fallback("q", Ok(vec![item("a", 0)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start(&api, &cache);
    let q = custom(1, "Q", "q");

    engine.send(Request::SyncQueries {
        queries: vec![q.clone()],
    });
    wait_until(|| api.calls("q") >= 1);
    for _ in 0..5 {
        engine.send(Request::RefreshNow { id: q.id });
        engine.send(Request::RefreshAll);
    }
    for _ in 0..2 {
        wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    }
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(api.peak_in_flight("q"), 1);
    // Refreshes sent during a poll collapse into one follow-up poll.
    assert_eq!(api.calls("q"), 2);

    engine.send(Request::Shutdown);
}

#[test]
fn retry_delay_does_not_hold_a_request_slot() {
    let api = Arc::new(StubSearchApi::new());
    api.push("flaky", Err(SearchError::Transient("502 Bad Gateway".into())));
    api.set_fallback("flaky", Ok(vec![item("a", 1)]));
    api.set_fallback("other", Ok(vec![item("b", 1)]));
    let cache = ResultCache::new(false);
    let (engine, rx) = start_with(
        Arc::clone(&api),
        &cache,
        PollSettings {
            max_concurrent: 1,
            retry: RetryPolicy {
                attempts: 1,
                base_delay: Duration::from_secs(1),
            },
            ..settings()
        },
    );
    let (flaky, other) = (custom(1, "Flaky", "flaky"), custom(2, "Other", "other"));

    engine.send(Request::SyncQueries {
        queries: vec![flaky.clone()],
    });
    wait_until(|| api.calls("flaky") >= 1);

    // The flaky search is now waiting to retry; the other one must not wait
    // for it.
    let started = Instant::now();
    engine.send(Request::SyncQueries {
        queries: vec![flaky.clone(), other.clone()],
    });
    let first = wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(first.query_id(), other.id);
    assert!(started.elapsed() < Duration::from_millis(600));

    let second = wait_for(&rx, |e| matches!(e, Event::ResultsUpdated { .. }));
    assert_eq!(second.query_id(), flaky.id);

    engine.send(Request::Shutdown);
}
