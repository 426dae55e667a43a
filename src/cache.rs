//! Per saved search result sets and poll state.
//!
//! The engine is the only writer. Readers get `Arc<ResultSet>` snapshots:
//! a successful poll builds a new set and swaps it in, so a reader never
//! observes a half-merged state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use indexmap::IndexMap;

use crate::types::{PollFailure, PollPhase, PollState, QueryId, RemoteItem, ResultSet};

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Build the next item list for a saved search.
///
/// Items are deduplicated by id. Among duplicates the most recent
/// `updated_at` wins; on equal timestamps the later-seen entry wins. With
/// `retain_missing`, items of `previous` absent from `fetched` are carried
/// over, otherwise the fetch replaces the previous set entirely.
///
/// Output is sorted by `updated_at` descending, then `id` ascending.
pub fn merge(
    previous: Option<&ResultSet>,
    fetched: Vec<RemoteItem>,
    retain_missing: bool,
) -> Vec<RemoteItem> {
    let mut by_id: IndexMap<String, RemoteItem> = IndexMap::with_capacity(fetched.len());
    for item in fetched {
        match by_id.get(&item.id) {
            Some(existing) if existing.updated_at > item.updated_at => {}
            _ => {
                by_id.insert(item.id.clone(), item);
            }
        }
    }

    if retain_missing && let Some(prev) = previous {
        for item in &prev.items {
            if !by_id.contains_key(&item.id) {
                by_id.insert(item.id.clone(), item.clone());
            }
        }
    }

    let mut items: Vec<RemoteItem> = by_id.into_values().collect();
    items.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    items
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Proof of registration handed to a poll task.
///
/// Every write goes through a ticket; once the saved search is forgotten or
/// registered again, writes with the old ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    id: QueryId,
    epoch: u64,
}

impl Ticket {
    pub fn id(self) -> QueryId {
        self.id
    }
}

#[derive(Default)]
struct Entry {
    epoch: u64,
    results: Option<Arc<ResultSet>>,
    poll: PollState,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryId, Entry>,
    next_epoch: u64,
}

/// Shared handle to the current results of every registered saved search.
///
/// Cheaply cloneable; owned by the composition root and handed to the engine
/// and the presenter.
#[derive(Clone, Default)]
pub struct ResultCache {
    inner: Arc<RwLock<Inner>>,
    retain_missing: bool,
}

impl ResultCache {
    pub fn new(retain_missing: bool) -> Self {
        Self {
            inner: Arc::default(),
            retain_missing,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a saved search, discarding anything held for it so far.
    pub fn register(&self, id: QueryId) -> Ticket {
        let mut inner = self.write();
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;
        inner.entries.insert(
            id,
            Entry {
                epoch,
                ..Entry::default()
            },
        );
        Ticket { id, epoch }
    }

    /// Stop tracking a saved search. Pending writes for it are dropped.
    pub fn forget(&self, id: QueryId) {
        self.write().entries.remove(&id);
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.read()
            .entries
            .get(&ticket.id)
            .is_some_and(|e| e.epoch == ticket.epoch)
    }

    /// Update the poll phase. Returns `false` for a stale ticket.
    pub fn set_phase(&self, ticket: Ticket, phase: PollPhase) -> bool {
        let mut inner = self.write();
        match current_entry(&mut inner, ticket) {
            Some(entry) => {
                entry.poll.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Merge a successful fetch into a new result set and swap it in.
    ///
    /// Returns the new item count, or `None` if the ticket is stale and the
    /// fetch was discarded.
    pub fn commit_success(
        &self,
        ticket: Ticket,
        fetched: Vec<RemoteItem>,
        truncated: bool,
    ) -> Option<usize> {
        // Only this ticket's poll task writes results, so building the merge
        // outside the lock cannot race with another merge.
        let previous = self.snapshot(ticket.id);
        let items = merge(previous.as_deref(), fetched, self.retain_missing);
        let now = Utc::now();
        let set = Arc::new(ResultSet {
            items,
            fetched_at: now,
            truncated,
        });
        let count = set.items.len();

        let mut inner = self.write();
        let entry = current_entry(&mut inner, ticket)?;
        entry.results = Some(set);
        entry.poll = PollState {
            phase: PollPhase::Idle,
            last_success_at: Some(now),
            last_error: None,
            consecutive_failures: 0,
        };
        Some(count)
    }

    /// Record a failed poll. The previous result set is kept as is.
    ///
    /// Returns the number of consecutive failures, or `None` for a stale
    /// ticket.
    pub fn commit_failure(
        &self,
        ticket: Ticket,
        failure: PollFailure,
        phase: PollPhase,
    ) -> Option<u32> {
        let mut inner = self.write();
        let entry = current_entry(&mut inner, ticket)?;
        entry.poll.consecutive_failures = entry.poll.consecutive_failures.saturating_add(1);
        entry.poll.last_error = Some(failure);
        entry.poll.phase = phase;
        Some(entry.poll.consecutive_failures)
    }

    /// The current results of a saved search, if it has polled successfully.
    pub fn snapshot(&self, id: QueryId) -> Option<Arc<ResultSet>> {
        self.read().entries.get(&id).and_then(|e| e.results.clone())
    }

    pub fn poll_state(&self, id: QueryId) -> Option<PollState> {
        self.read().entries.get(&id).map(|e| e.poll.clone())
    }

    /// Ids of all registered saved searches.
    pub fn ids(&self) -> Vec<QueryId> {
        self.read().entries.keys().copied().collect()
    }
}

fn current_entry(inner: &mut Inner, ticket: Ticket) -> Option<&mut Entry> {
    inner
        .entries
        .get_mut(&ticket.id)
        .filter(|e| e.epoch == ticket.epoch)
}
