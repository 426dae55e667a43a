use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::SearchError;

/// Where a saved search currently is in its poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Polling,
    /// Last attempt failed; the next one is scheduled after `retry_in`.
    Backoff { retry_in: Duration },
    /// Polling stopped until credentials change or the query is edited.
    Paused { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Auth,
    RateLimited,
    Transient,
    InvalidQuery,
}

impl FailureKind {
    /// Whether polling should stop until something outside the engine changes.
    pub fn pauses_polling(self) -> bool {
        matches!(self, Self::Auth | Self::InvalidQuery)
    }
}

/// The last failed attempt of a saved search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl PollFailure {
    pub fn from_error(error: &SearchError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

/// Per saved search poll bookkeeping, surfaced to the UI as staleness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollState {
    pub phase: PollPhase,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<PollFailure>,
    pub consecutive_failures: u32,
}

impl PollState {
    /// Cached results are older than the last attempt.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }
}
