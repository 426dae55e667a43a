use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gh_searches::error::SearchError;
use gh_searches::github::{
    CredentialProvider, FetchLimits, GitHubSearchApi, PageCursor, RetryPolicy, SearchApi,
    StaticToken, execute_all, install_crypto_provider,
};
use gh_searches::types::{ItemKind, ItemState, SearchScope};

fn api(server: &MockServer, cache_ttl: Duration) -> GitHubSearchApi {
    install_crypto_provider();
    GitHubSearchApi::new(server.uri(), Arc::new(StaticToken::new("test-token")), cache_ttl)
}

fn issue(n: u64, updated_at: &str) -> serde_json::Value {
    json!({
        "node_id": format!("I_{n}"),
        "number": n,
        "title": format!("Issue {n}"),
        "html_url": format!("https://github.com/acme/widgets/issues/{n}"),
        "state": "open",
        "updated_at": updated_at,
        "repository_url": "https://api.github.com/repos/acme/widgets",
        "user": { "login": "octocat" }
    })
}

fn page(total: u64, items: Vec<serde_json::Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "total_count": total,
        "incomplete_results": false,
        "items": items,
    }))
}

fn next_link(server: &MockServer, page: u32) -> String {
    format!(
        r#"<{}/search/issues?q=x&per_page=2&page={page}>; rel="next""#,
        server.uri()
    )
}

#[tokio::test]
async fn sends_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "is:open author:@me"))
        .and(query_param("advanced_search", "true"))
        .and(query_param("per_page", "30"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(page(1, vec![issue(1, "2025-01-02T10:00:00Z")]))
        .expect(1)
        .mount(&server)
        .await;

    let page = api(&server, Duration::ZERO)
        .fetch_page(SearchScope::Issues, "is:open author:@me", None, 30, false)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].kind, ItemKind::Issue);
    assert_eq!(page.items[0].state, Some(ItemState::Open));
    assert_eq!(page.next, None);
}

#[tokio::test]
async fn follows_link_header_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("page", "1"))
        .respond_with(
            page(
                3,
                vec![
                    issue(1, "2025-01-03T10:00:00Z"),
                    issue(2, "2025-01-02T10:00:00Z"),
                ],
            )
            .insert_header("link", next_link(&server, 2).as_str()),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("page", "2"))
        .respond_with(page(3, vec![issue(3, "2025-01-01T10:00:00Z")]))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server, Duration::ZERO);
    let first = api
        .fetch_page(SearchScope::Issues, "x", None, 2, false)
        .await
        .unwrap();
    assert_eq!(first.next, Some(PageCursor(2)));

    let all = execute_all(
        &api,
        SearchScope::Issues,
        "x",
        FetchLimits {
            per_page: 2,
            max_items: 100,
        },
        RetryPolicy::NONE,
        false,
    )
    .await
    .unwrap();
    let ids: Vec<_> = all.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["I_1", "I_2", "I_3"]);
    assert!(!all.truncated);
}

#[tokio::test]
async fn pagination_stops_at_item_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("page", "1"))
        .respond_with(
            page(
                10,
                vec![
                    issue(1, "2025-01-03T10:00:00Z"),
                    issue(2, "2025-01-02T10:00:00Z"),
                ],
            )
            .insert_header("link", next_link(&server, 2).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetched = execute_all(
        &api(&server, Duration::ZERO),
        SearchScope::Issues,
        "x",
        FetchLimits {
            per_page: 2,
            max_items: 2,
        },
        RetryPolicy::NONE,
        false,
    )
    .await
    .unwrap();
    assert_eq!(fetched.items.len(), 2);
    assert!(fetched.truncated);
}

#[tokio::test]
async fn unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = api(&server, Duration::ZERO)
        .fetch_page(SearchScope::Issues, "x", None, 10, false)
        .await
        .unwrap_err();
    assert_eq!(err, SearchError::Auth("Bad credentials".into()));
}

#[tokio::test]
async fn exhausted_quota_is_rate_limited_until_reset() {
    let server = MockServer::start().await;
    let reset = Utc::now().timestamp() + 120;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-limit", "30")
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let err = api(&server, Duration::ZERO)
        .fetch_page(SearchScope::Issues, "x", None, 10, false)
        .await
        .unwrap_err();
    let SearchError::RateLimited { retry_after } = err else {
        panic!("expected RateLimited, got {err:?}");
    };
    assert!(retry_after > Duration::from_secs(100));
    assert!(retry_after <= Duration::from_secs(120));
}

#[tokio::test]
async fn too_many_requests_uses_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let err = api(&server, Duration::ZERO)
        .fetch_page(SearchScope::Repositories, "x", None, 10, false)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SearchError::RateLimited {
            retry_after: Duration::from_secs(30)
        }
    );
}

#[tokio::test]
async fn rejected_syntax_is_invalid_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Validation Failed",
            "errors": [{ "message": "The search is longer than 256 characters." }]
        })))
        .mount(&server)
        .await;

    let err = api(&server, Duration::ZERO)
        .fetch_page(SearchScope::Issues, "x", None, 10, false)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SearchError::InvalidQuery(
            "Validation Failed [The search is longer than 256 characters.]".into()
        )
    );
}

#[tokio::test]
async fn server_errors_are_retried_then_surface_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = execute_all(
        &api(&server, Duration::ZERO),
        SearchScope::Issues,
        "x",
        FetchLimits::default(),
        RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        },
        false,
    )
    .await
    .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn repeated_page_requests_hit_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/users"))
        .respond_with(page(
            1,
            vec![json!({ "login": "octocat", "node_id": "U_1", "type": "User" })],
        ))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server, Duration::from_secs(60));
    for _ in 0..2 {
        let page = api
            .fetch_page(SearchScope::Users, "octo", None, 10, false)
            .await
            .unwrap();
        assert_eq!(page.items[0].title, "octocat");
    }
}

#[tokio::test]
async fn forced_fetch_skips_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .respond_with(page(1, vec![issue(1, "2025-01-02T10:00:00Z")]))
        .expect(3)
        .mount(&server)
        .await;

    let api = api(&server, Duration::from_secs(60));
    api.fetch_page(SearchScope::Issues, "x", None, 10, false)
        .await
        .unwrap();
    api.fetch_page(SearchScope::Issues, "x", None, 10, true)
        .await
        .unwrap();
    api.fetch_page(SearchScope::Issues, "x", None, 10, true)
        .await
        .unwrap();
    // The forced fetch refreshed the cached page.
    api.fetch_page(SearchScope::Issues, "x", None, 10, false)
        .await
        .unwrap();
}

/// A token that can be swapped, like a `gh auth switch`.
struct SwitchableToken(Mutex<String>);

impl CredentialProvider for SwitchableToken {
    fn token(&self) -> Result<String, SearchError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

#[tokio::test]
async fn cached_pages_are_not_shared_between_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(header("authorization", "Bearer alice-token"))
        .respond_with(page(1, vec![issue(1, "2025-01-02T10:00:00Z")]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(header("authorization", "Bearer bob-token"))
        .respond_with(page(1, vec![issue(2, "2025-01-02T10:00:00Z")]))
        .expect(1)
        .mount(&server)
        .await;

    install_crypto_provider();
    let token = Arc::new(SwitchableToken(Mutex::new("alice-token".into())));
    let api = GitHubSearchApi::new(server.uri(), token.clone(), Duration::from_secs(60));

    let alice = api
        .fetch_page(SearchScope::Issues, "author:@me", None, 10, false)
        .await
        .unwrap();
    assert_eq!(alice.items[0].id, "I_1");

    *token.0.lock().unwrap() = "bob-token".into();
    let bob = api
        .fetch_page(SearchScope::Issues, "author:@me", None, 10, false)
        .await
        .unwrap();
    assert_eq!(bob.items[0].id, "I_2");
}
