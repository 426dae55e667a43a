//! The poll loop of one saved search.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{ResultCache, Ticket};
use crate::error::SearchError;
use crate::github::{PageCursor, SearchApi, SearchPage, execute_all};
use crate::types::{PollFailure, PollPhase, SearchScope};

use super::interface::Event;
use super::refresh::Backoff;
use super::scheduler::PollSettings;

/// A [`SearchApi`] holding one global permit per page request.
///
/// Retry delays and the waits between pages happen without a permit, so a
/// flaky search does not keep a slot from the others.
pub(super) struct Throttled<A> {
    api: Arc<A>,
    permits: Semaphore,
}

impl<A> Throttled<A> {
    pub fn new(api: Arc<A>, max_concurrent: usize) -> Self {
        Self {
            api,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }
}

impl<A: SearchApi> SearchApi for Throttled<A> {
    async fn fetch_page(
        &self,
        scope: SearchScope,
        query: &str,
        cursor: Option<PageCursor>,
        per_page: u32,
        force: bool,
    ) -> Result<SearchPage, SearchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SearchError::Transient("engine is shutting down".to_owned()))?;
        self.api
            .fetch_page(scope, query, cursor, per_page, force)
            .await
    }
}

/// Everything the poll tasks share.
pub(super) struct PollContext<A> {
    pub api: Throttled<A>,
    pub cache: ResultCache,
    pub settings: PollSettings,
    pub events: Option<Sender<Event>>,
}

impl<A> PollContext<A> {
    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// What the loop does after one poll cycle.
enum Next {
    After(Duration),
    /// Wait for an explicit wake-up.
    Paused,
    /// The ticket went stale: the search was removed or restarted.
    Stop,
}

/// The search a task polls.
pub(super) struct PollTarget {
    pub ticket: Ticket,
    pub scope: SearchScope,
    pub query: String,
}

/// Poll `target` until `cancel` fires.
///
/// Cycles run strictly one after the other, so a search never has more than
/// one request in flight. `wake` cuts the wait between two cycles short and
/// makes the next cycle bypass any page cache.
pub(super) async fn run<A: SearchApi>(
    ctx: Arc<PollContext<A>>,
    target: PollTarget,
    cancel: CancellationToken,
    wake: Arc<Notify>,
) {
    let mut backoff = Backoff::new(ctx.settings.interval, ctx.settings.max_interval);
    let mut force = false;
    debug!(query_id = %target.ticket.id(), "poll task started");

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = poll_once(&ctx, &target, &mut backoff, force) => next,
        };

        let wait = match next {
            Next::After(delay) => Some(delay),
            Next::Paused => None,
            Next::Stop => break,
        };

        force = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = wake.notified() => true,
            () = sleep_or_forever(wait) => false,
        };
    }

    debug!(query_id = %target.ticket.id(), "poll task stopped");
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

async fn poll_once<A: SearchApi>(
    ctx: &PollContext<A>,
    target: &PollTarget,
    backoff: &mut Backoff,
    force: bool,
) -> Next {
    let ticket = target.ticket;
    if !ctx.cache.set_phase(ticket, PollPhase::Polling) {
        return Next::Stop;
    }

    let result = execute_all(
        &ctx.api,
        target.scope,
        &target.query,
        ctx.settings.limits,
        ctx.settings.retry,
        force,
    )
    .await;

    match result {
        Ok(fetched) => {
            let truncated = fetched.truncated;
            let Some(count) = ctx.cache.commit_success(ticket, fetched.items, truncated) else {
                return Next::Stop;
            };
            debug!(query_id = %ticket.id(), count, truncated, "poll succeeded");
            ctx.emit(Event::ResultsUpdated {
                query_id: ticket.id(),
                count,
                truncated,
            });
            Next::After(backoff.reset())
        }
        Err(err) => on_failure(ctx, ticket, &err, backoff),
    }
}

fn on_failure<A>(
    ctx: &PollContext<A>,
    ticket: Ticket,
    err: &SearchError,
    backoff: &mut Backoff,
) -> Next {
    let failure = PollFailure::from_error(err);
    let message = failure.message.clone();

    if failure.kind.pauses_polling() {
        let phase = PollPhase::Paused {
            reason: message.clone(),
        };
        if ctx.cache.commit_failure(ticket, failure, phase).is_none() {
            return Next::Stop;
        }
        warn!(query_id = %ticket.id(), "polling paused: {message}");
        ctx.emit(Event::PollPaused {
            query_id: ticket.id(),
            message,
        });
        return Next::Paused;
    }

    let mut retry_in = backoff.failure();
    if let SearchError::RateLimited { retry_after } = err {
        retry_in = retry_in.max(*retry_after);
    }
    let phase = PollPhase::Backoff { retry_in };
    let Some(failures) = ctx.cache.commit_failure(ticket, failure, phase) else {
        return Next::Stop;
    };
    warn!(
        query_id = %ticket.id(),
        failures,
        ?retry_in,
        "poll failed, keeping previous results: {message}"
    );
    ctx.emit(Event::PollFailed {
        query_id: ticket.id(),
        message,
        retry_in,
    });
    Next::After(retry_in)
}
