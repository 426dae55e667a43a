// REST search client.

pub mod auth;
mod client;
mod rate_limit;
pub mod search;
mod types;

pub use auth::{CredentialProvider, GhCliToken, StaticToken};
pub use client::{GitHubSearchApi, api_base_for_host, install_crypto_provider};
pub use search::{
    FetchLimits, FetchedResults, PageCursor, RetryPolicy, SearchApi, SearchPage, execute_all,
};
