use std::time::Duration;

use crate::types::{QueryId, SavedQuery};

/// Handle to the poll engine held by the launcher layer.
///
/// Cheaply cloneable. When the last handle is dropped the sender channel
/// closes, signalling the engine to shut down.
#[derive(Clone)]
pub struct EngineHandle {
    tx: tokio::sync::mpsc::UnboundedSender<Request>,
}

impl EngineHandle {
    pub(super) fn new(tx: tokio::sync::mpsc::UnboundedSender<Request>) -> Self {
        Self { tx }
    }

    /// Send a request to the engine. Non-blocking.
    pub fn send(&self, req: Request) {
        // Ignore errors: if the receiver is gone the engine has already shut down.
        let _ = self.tx.send(req);
    }
}

/// Implemented by `PollScheduler`, whatever search backend it drives.
pub trait Engine: Send + 'static {
    fn start(self) -> EngineHandle;
}

/// All operations the launcher layer can send to the engine.
#[derive(Debug, Clone)]
pub enum Request {
    /// Replace the set of polled searches.
    ///
    /// New searches start polling, removed ones are cancelled and their
    /// results dropped, searches whose query or scope changed restart from
    /// scratch. Everything else keeps its schedule.
    SyncQueries { queries: Vec<SavedQuery> },
    /// Poll one search as soon as its current poll (if any) completes.
    RefreshNow { id: QueryId },
    /// `RefreshNow` for every search, paused ones included.
    RefreshAll,
    /// Resume searches paused on an authentication failure.
    CredentialsChanged,
    Shutdown,
}

/// Events the engine pushes back after each poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ResultsUpdated {
        query_id: QueryId,
        count: usize,
        truncated: bool,
    },
    /// The poll failed; previous results are kept and the next attempt is
    /// scheduled after `retry_in`.
    PollFailed {
        query_id: QueryId,
        message: String,
        retry_in: Duration,
    },
    /// The poll failed in a way retrying cannot fix. Polling of this search
    /// stops until credentials change, the search is edited or a refresh is
    /// requested.
    PollPaused { query_id: QueryId, message: String },
}

impl Event {
    pub fn query_id(&self) -> QueryId {
        match self {
            Self::ResultsUpdated { query_id, .. }
            | Self::PollFailed { query_id, .. }
            | Self::PollPaused { query_id, .. } => *query_id,
        }
    }
}
