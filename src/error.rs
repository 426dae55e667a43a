use std::time::Duration;

use thiserror::Error;

use crate::types::{FailureKind, QueryId};

/// Errors from editing the saved search store. Surfaced to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("a saved search titled \"{0}\" already exists")]
    DuplicateTitle(String),
    #[error("no saved search with id {0}")]
    NotFound(QueryId),
    #[error("built-in search {0} cannot be removed, hide it instead")]
    CannotRemoveBuiltin(QueryId),
    #[error("{0} is not a built-in search")]
    NotBuiltin(QueryId),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Errors from executing a search against the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// Credentials missing, invalid or expired. Not retried.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Primary or secondary rate limit hit.
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    /// Network failure or server-side error. Retried with backoff.
    #[error("network error: {0}")]
    Transient(String),
    /// The search syntax was rejected (HTTP 422). Not retried.
    #[error("invalid search query: {0}")]
    InvalidQuery(String),
}

impl SearchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Transient(_) => FailureKind::Transient,
            Self::InvalidQuery(_) => FailureKind::InvalidQuery,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
