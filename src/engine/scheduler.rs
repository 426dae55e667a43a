use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cache::ResultCache;
use crate::config::types::AppConfig;
use crate::github::{FetchLimits, RetryPolicy, SearchApi};
use crate::types::{FailureKind, PollPhase, QueryId, SavedQuery};

use super::interface::{Engine, EngineHandle, Event, Request};
use super::poller::{self, PollContext, PollTarget, Throttled};

/// Timing and bounds shared by every poll task.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Delay between successful polls, and the backoff base.
    pub interval: Duration,
    pub max_interval: Duration,
    /// Upper bound on page requests in flight across all searches.
    pub max_concurrent: usize,
    pub limits: FetchLimits,
    pub retry: RetryPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PollSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let p = &config.polling;
        Self {
            interval: Duration::from_secs(p.interval_seconds.max(1)),
            max_interval: Duration::from_secs(p.max_interval_seconds),
            max_concurrent: p.max_concurrent.max(1),
            limits: FetchLimits {
                per_page: config.github.per_page,
                max_items: config.github.max_items,
            },
            retry: RetryPolicy {
                attempts: p.retry_attempts,
                base_delay: Duration::from_millis(p.retry_base_millis),
            },
        }
    }
}

/// One running poll task.
struct PollTask {
    query: SavedQuery,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    join: JoinHandle<()>,
}

/// Engine that polls every synced saved search on its own schedule and
/// commits the results into a shared [`ResultCache`].
///
/// Each search gets one task running in a Tokio runtime on a dedicated OS
/// thread. A failing search only ever delays itself.
pub struct PollScheduler<A> {
    api: Arc<A>,
    cache: ResultCache,
    settings: PollSettings,
    events: Option<Sender<Event>>,
}

impl<A: SearchApi> PollScheduler<A> {
    pub fn new(api: Arc<A>, cache: ResultCache, settings: PollSettings) -> Self {
        Self {
            api,
            cache,
            settings,
            events: None,
        }
    }

    /// Push an [`Event`] to `tx` after every poll cycle.
    pub fn with_events(mut self, tx: Sender<Event>) -> Self {
        self.events = Some(tx);
        self
    }
}

impl<A: SearchApi> Engine for PollScheduler<A> {
    fn start(self) -> EngineHandle {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Request>();
        let handle = EngineHandle::new(tx);
        let spawned = std::thread::Builder::new()
            .name("gh-searches-engine".to_owned())
            .spawn(move || match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(self.run_loop(rx)),
                Err(e) => error!("engine: cannot start tokio runtime: {e}"),
            });
        if let Err(e) = spawned {
            error!("engine: cannot spawn engine thread: {e}");
        }
        handle
    }
}

impl<A: SearchApi> PollScheduler<A> {
    async fn run_loop(self, mut rx: UnboundedReceiver<Request>) {
        let root = CancellationToken::new();
        let ctx = Arc::new(PollContext {
            api: Throttled::new(self.api, self.settings.max_concurrent),
            cache: self.cache,
            settings: self.settings,
            events: self.events,
        });
        let mut tasks: HashMap<QueryId, PollTask> = HashMap::new();

        while let Some(req) = rx.recv().await {
            match req {
                Request::SyncQueries { queries } => {
                    sync(&ctx, &root, &mut tasks, queries);
                }
                Request::RefreshNow { id } => match tasks.get(&id) {
                    Some(task) => task.wake.notify_one(),
                    None => debug!(query_id = %id, "engine: refresh of unknown search ignored"),
                },
                Request::RefreshAll => {
                    for task in tasks.values() {
                        task.wake.notify_one();
                    }
                }
                Request::CredentialsChanged => {
                    for (id, task) in &tasks {
                        if paused_on_auth(&ctx.cache, *id) {
                            debug!(query_id = %id, "engine: resuming after credentials change");
                            task.wake.notify_one();
                        }
                    }
                }
                Request::Shutdown => break,
            }
        }

        debug!("engine: shutting down");
        root.cancel();
        for (id, task) in tasks.drain() {
            ctx.cache.forget(id);
            let _ = task.join.await;
        }
    }
}

fn paused_on_auth(cache: &ResultCache, id: QueryId) -> bool {
    cache.poll_state(id).is_some_and(|state| {
        matches!(state.phase, PollPhase::Paused { .. })
            && state
                .last_error
                .is_some_and(|e| e.kind == FailureKind::Auth)
    })
}

/// Bring the running tasks in line with `queries`.
fn sync<A: SearchApi>(
    ctx: &Arc<PollContext<A>>,
    root: &CancellationToken,
    tasks: &mut HashMap<QueryId, PollTask>,
    queries: Vec<SavedQuery>,
) {
    let wanted: HashSet<QueryId> = queries.iter().map(|q| q.id).collect();

    tasks.retain(|id, task| {
        if wanted.contains(id) {
            return true;
        }
        debug!(query_id = %id, "engine: search removed, cancelling");
        task.cancel.cancel();
        ctx.cache.forget(*id);
        false
    });

    for query in queries {
        match tasks.get_mut(&query.id) {
            Some(task) if task.query.same_search(&query) => {
                task.query = query;
            }
            Some(task) => {
                debug!(query_id = %query.id, "engine: search changed, restarting");
                task.cancel.cancel();
                *task = spawn(ctx, root, query);
            }
            None => {
                let id = query.id;
                tasks.insert(id, spawn(ctx, root, query));
            }
        }
    }
}

fn spawn<A: SearchApi>(
    ctx: &Arc<PollContext<A>>,
    root: &CancellationToken,
    query: SavedQuery,
) -> PollTask {
    let ticket = ctx.cache.register(query.id);
    let cancel = root.child_token();
    let wake = Arc::new(Notify::new());
    let target = PollTarget {
        ticket,
        scope: query.scope,
        query: query.query.clone(),
    };
    let join = tokio::spawn(poller::run(
        Arc::clone(ctx),
        target,
        cancel.clone(),
        Arc::clone(&wake),
    ));
    PollTask {
        query,
        cancel,
        wake,
        join,
    }
}
