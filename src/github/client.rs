use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use http::header::{ACCEPT, LINK};
use moka::future::Cache;
use octocrab::Octocrab;
use octocrab::service::middleware::retry::RetryConfig;
use tracing::debug;

use crate::error::SearchError;
use crate::github::auth::CredentialProvider;
use crate::github::rate_limit;
use crate::github::search::{PageCursor, SearchApi, SearchPage};
use crate::github::types::decode_page;
use crate::types::SearchScope;

const API_VERSION: &str = "2022-11-28";
const CACHE_CAPACITY: u64 = 500;

/// Install the rustls CryptoProvider before any TLS client is constructed.
///
/// rustls 0.23 no longer auto-installs a provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// REST API root for a GitHub host.
pub fn api_base_for_host(host: &str) -> String {
    if host == "github.com" {
        "https://api.github.com".to_owned()
    } else {
        format!("https://{host}/api/v3")
    }
}

/// Search client backed by one Octocrab instance and a short-lived page
/// cache.
///
/// The Octocrab instance is rebuilt whenever the credential provider hands
/// out a different token. Cached pages are keyed per token, so a switch of
/// account never serves the previous account's `@me` results.
pub struct GitHubSearchApi {
    base_uri: String,
    credentials: Arc<dyn CredentialProvider>,
    instance: Mutex<Option<(String, Arc<Octocrab>)>>,
    cache: Option<Cache<String, SearchPage>>,
}

impl GitHubSearchApi {
    /// `cache_ttl` of zero disables the page cache.
    pub fn new(
        base_uri: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        cache_ttl: Duration,
    ) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build()
        });
        Self {
            base_uri: base_uri.into().trim_end_matches('/').to_owned(),
            credentials,
            instance: Mutex::new(None),
            cache,
        }
    }

    /// Client for the given host, authenticated through `credentials`.
    pub fn for_host(
        host: &str,
        credentials: Arc<dyn CredentialProvider>,
        cache_ttl: Duration,
    ) -> Self {
        Self::new(api_base_for_host(host), credentials, cache_ttl)
    }

    fn octocrab(&self, token: String) -> Result<Arc<Octocrab>, SearchError> {
        let mut slot = self.instance.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_token, instance)) = slot.as_ref()
            && *cached_token == token
        {
            return Ok(Arc::clone(instance));
        }

        let instance = Octocrab::builder()
            .personal_token(token.clone())
            .base_uri(self.base_uri.as_str())
            .map_err(|e| SearchError::Transient(format!("invalid API base URI: {e}")))?
            .add_header(ACCEPT, "application/vnd.github+json".to_owned())
            .add_header(
                http::HeaderName::from_static("x-github-api-version"),
                API_VERSION.to_owned(),
            )
            .add_retry_config(RetryConfig::None)
            .build()
            .map(Arc::new)
            .map_err(|e| SearchError::Transient(format!("building octocrab instance: {e}")))?;
        *slot = Some((token, Arc::clone(&instance)));
        Ok(instance)
    }

    fn search_uri(&self, scope: SearchScope, query: &str, page: u32, per_page: u32) -> String {
        let mut uri = format!(
            "{}/search/{}?q={}&per_page={per_page}&page={page}",
            self.base_uri,
            scope.endpoint(),
            urlencoding::encode(query),
        );
        if scope == SearchScope::Issues {
            uri.push_str("&advanced_search=true");
        }
        uri
    }

    async fn fetch_uncached(
        &self,
        scope: SearchScope,
        uri: &str,
        token: String,
    ) -> Result<SearchPage, SearchError> {
        let octocrab = self.octocrab(token)?;
        let response = octocrab
            ._get(uri)
            .await
            .map_err(|e| SearchError::Transient(format!("{e}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = octocrab
            .body_to_string(response)
            .await
            .map_err(|e| SearchError::Transient(format!("reading response body: {e}")))?;

        if !status.is_success() {
            return Err(rate_limit::classify(status, &headers, &body, Utc::now()));
        }

        let decoded = decode_page(scope, &body)
            .map_err(|e| SearchError::Transient(format!("decoding search response: {e}")))?;
        if decoded.incomplete_results {
            debug!(uri, "search returned incomplete results");
        }
        Ok(SearchPage {
            items: decoded.items,
            next: next_page(&headers).map(PageCursor),
            total_count: decoded.total_count,
            rate_limit: rate_limit::rate_limit_info(&headers),
        })
    }
}

impl SearchApi for GitHubSearchApi {
    async fn fetch_page(
        &self,
        scope: SearchScope,
        query: &str,
        cursor: Option<PageCursor>,
        per_page: u32,
        force: bool,
    ) -> Result<SearchPage, SearchError> {
        let token = self.credentials.token()?;
        let page = cursor.map_or(1, |c| c.0);
        let uri = self.search_uri(scope, query, page, per_page);
        let key = cache_key(&token, &uri);

        if !force
            && let Some(cache) = &self.cache
            && let Some(hit) = cache.get(&key).await
        {
            debug!(uri, "search page cache hit");
            return Ok(hit);
        }

        debug!(uri, force, "fetching search page");
        let fetched = self.fetch_uncached(scope, &uri, token).await?;
        if let Some(cache) = &self.cache {
            cache.insert(key, fetched.clone()).await;
        }
        Ok(fetched)
    }
}

/// Page cache key: the request URI under a fingerprint of the token.
fn cache_key(token: &str, uri: &str) -> String {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("{:016x} {uri}", hasher.finish())
}

/// Page number of the `rel="next"` entry of a `Link` header.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let (_, query) = target.split_once('?')?;
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix("page="))
            .and_then(|n| n.parse().ok())
    })
}
