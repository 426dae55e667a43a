use std::path::PathBuf;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub github: GitHubConfig,
    pub polling: PollingConfig,
    pub display: DisplayConfig,
    /// Where saved searches are persisted. Defaults to `searches.toml` next
    /// to the config file.
    pub state_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// `github.com` or a GitHub Enterprise host.
    pub host: String,
    pub per_page: u32,
    /// Cap on items fetched per search and poll cycle.
    pub max_items: u32,
    /// Lifetime of cached search pages. 0 disables the cache.
    pub cache_ttl_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            host: "github.com".to_owned(),
            per_page: 50,
            max_items: 200,
            cache_ttl_seconds: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    /// Upper bound of the failure backoff.
    pub max_interval_seconds: u64,
    pub max_concurrent: usize,
    /// In-cycle retries of a transient page failure.
    pub retry_attempts: u32,
    pub retry_base_millis: u64,
    /// Keep items that dropped out of a search until the next restart.
    pub retain_missing: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            max_interval_seconds: 3600,
            max_concurrent: 4,
            retry_attempts: 2,
            retry_base_millis: 500,
            retain_missing: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Drop searches without results from the listing instead of showing
    /// them as empty sections.
    pub hide_empty: bool,
    /// `relative` or a chrono format string.
    pub date_format: String,
    /// Launcher keyword that prefixes a saved search's "Show" action.
    pub trigger: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            hide_empty: false,
            date_format: "relative".to_owned(),
            trigger: "gh".to_owned(),
        }
    }
}
