use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use gh_searches::actions::open_in_browser;
use gh_searches::cache::ResultCache;
use gh_searches::config::{AppConfig, load_config, resolve_state_path};
use gh_searches::engine::{Engine, Event, PollScheduler, PollSettings, Request};
use gh_searches::github::{self, GhCliToken, GitHubSearchApi};
use gh_searches::present::{
    ActionTarget, PresentationRecord, Section, SectionOptions, parse_launcher_input, present,
    present_saved_query, sections,
};
use gh_searches::store::QueryStore;
use gh_searches::types::{SavedQuery, SearchScope};
use gh_searches::util::format_date;

#[derive(Parser)]
#[command(
    name = "gh-searches",
    version,
    about = "Saved GitHub searches, polled in the background"
)]
struct Cli {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging to debug.log.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved searches.
    List {
        /// Include hidden built-in searches.
        #[arg(long)]
        all: bool,
    },
    /// Saved searches whose title contains TEXT, as launcher entries.
    Find {
        #[arg(default_value = "")]
        text: String,
    },
    /// Add a saved search.
    Add {
        title: String,
        query: String,
        #[arg(long, value_enum, default_value_t = Scope::Issues)]
        scope: Scope,
    },
    /// Change the title and/or query of a saved search.
    Edit {
        /// Title or id (e.g. `custom:3`) of the search.
        search: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        query: Option<String>,
    },
    /// Remove a user-defined saved search.
    Remove { search: String },
    /// Hide a built-in search.
    Hide { search: String },
    /// Show a hidden built-in search again.
    Unhide { search: String },
    /// Reset all built-in searches and show them again.
    RestoreDefaults,
    /// Run one saved search once and print its results.
    Show { search: String },
    /// Run an ad-hoc search once and print its results.
    ///
    /// Accepts launcher input as produced by `find` (`ghi is:open`,
    /// `ghr language:rust`, `ghu octocat`) or a bare query.
    Search {
        /// Search endpoint; overrides a scope trigger in the input.
        #[arg(long, value_enum)]
        scope: Option<Scope>,
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Poll all visible searches and print each update.
    Watch,
    /// Run an action of the N-th result (1-based) of a saved search.
    Open {
        search: String,
        index: usize,
        /// Action id, defaults to the primary action.
        #[arg(long)]
        action: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scope {
    Issues,
    Repositories,
    Users,
}

impl From<Scope> for SearchScope {
    fn from(s: Scope) -> Self {
        match s {
            Scope::Issues => Self::Issues,
            Scope::Repositories => Self::Repositories,
            Scope::Users => Self::Users,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing.
    if cli.debug {
        let file = std::fs::File::create("debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    let config = load_config(cli.config.as_deref())?;
    let state_path = resolve_state_path(&config)?;
    let mut store = QueryStore::load(&state_path)?;

    match cli.command {
        Commands::List { all } => {
            for q in store.list() {
                print_query(&q, "");
            }
            if all {
                for q in store.hidden() {
                    print_query(&q, " (hidden)");
                }
            }
        }
        Commands::Find { text } => {
            for q in store.matching(&text) {
                let record =
                    present_saved_query(&q, &config.display.trigger, &config.github.host);
                print_record(&record);
            }
        }
        Commands::Add {
            title,
            query,
            scope,
        } => {
            let saved = store.add_scoped(&title, &query, scope.into())?;
            store.save(&state_path)?;
            println!("added {}", saved.id);
        }
        Commands::Edit {
            search,
            title,
            query,
        } => {
            let current = resolve(&store, &search)?.clone();
            let title = title.unwrap_or_else(|| current.title.clone());
            let query = query.unwrap_or_else(|| current.query.clone());
            let saved = store.update(current.id, &title, &query)?;
            store.save(&state_path)?;
            println!("updated {}", saved.id);
        }
        Commands::Remove { search } => {
            let id = resolve(&store, &search)?.id;
            let removed = store.remove(id)?;
            store.save(&state_path)?;
            println!("removed \"{}\"", removed.title);
        }
        Commands::Hide { search } => {
            let id = resolve(&store, &search)?.id;
            store.hide(id)?;
            store.save(&state_path)?;
        }
        Commands::Unhide { search } => {
            let id = resolve(&store, &search)?.id;
            store.unhide(id)?;
            store.save(&state_path)?;
        }
        Commands::RestoreDefaults => {
            store.restore_defaults();
            store.save(&state_path)?;
        }
        Commands::Show { search } => {
            let query = resolve(&store, &search)?.clone();
            print_results(&fetch_once(&config, query.scope, &query.query)?);
        }
        Commands::Search { scope, text } => {
            let text = text.join(" ");
            let (parsed_scope, query) = parse_launcher_input(&text, &config.display.trigger)
                .unwrap_or((SearchScope::Issues, text.trim()));
            let scope = scope.map_or(parsed_scope, SearchScope::from);
            if query.is_empty() {
                bail!("nothing to search for");
            }
            print_results(&fetch_once(&config, scope, query)?);
        }
        Commands::Watch => watch(&config, &state_path, store)?,
        Commands::Open {
            search,
            index,
            action,
        } => {
            let query = resolve(&store, &search)?.clone();
            let records = fetch_once(&config, query.scope, &query.query)?;
            let record = index
                .checked_sub(1)
                .and_then(|i| records.get(i))
                .with_context(|| format!("no result #{index} ({} results)", records.len()))?;
            let chosen = match &action {
                Some(id) => record.actions.iter().find(|a| a.id == id.as_str()),
                None => record.primary_action(),
            }
            .with_context(|| format!("no action {action:?} on \"{}\"", record.title))?;
            match &chosen.target {
                ActionTarget::OpenUrl(url) => open_in_browser(url).map_err(anyhow::Error::msg)?,
                ActionTarget::ShowQuery(text) => println!("{text}"),
            }
        }
    }

    Ok(())
}

/// Find a saved search by id (`builtin:mentions`, `custom:3`) or exact title.
fn resolve<'a>(store: &'a QueryStore, search: &str) -> Result<&'a SavedQuery> {
    if let Some(q) = store.find_by_title(search) {
        return Ok(q);
    }
    let by_id = store
        .list()
        .into_iter()
        .chain(store.hidden())
        .find(|q| q.id.to_string() == search)
        .and_then(|q| store.get(q.id));
    match by_id {
        Some(q) => Ok(q),
        None => bail!("no saved search titled or identified by {search:?}"),
    }
}

fn search_api(config: &AppConfig) -> GitHubSearchApi {
    github::install_crypto_provider();
    GitHubSearchApi::for_host(
        &config.github.host,
        Arc::new(GhCliToken::new(config.github.host.clone())),
        Duration::from_secs(config.github.cache_ttl_seconds),
    )
}

fn fetch_once(
    config: &AppConfig,
    scope: SearchScope,
    query: &str,
) -> Result<Vec<PresentationRecord>> {
    let api = search_api(config);
    let settings = PollSettings::from_config(config);
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let fetched = runtime.block_on(github::execute_all(
        &api,
        scope,
        query,
        settings.limits,
        settings.retry,
        false,
    ))?;
    if fetched.truncated {
        eprintln!("showing the first {} results", fetched.items.len());
    }
    // Same order a poll would produce.
    let items = gh_searches::cache::merge(None, fetched.items, false);
    Ok(items.iter().map(present).collect())
}

fn watch(config: &AppConfig, state_path: &Path, store: QueryStore) -> Result<()> {
    let cache = ResultCache::new(config.polling.retain_missing);
    let (tx, rx) = std::sync::mpsc::channel();
    let engine = PollScheduler::new(
        Arc::new(search_api(config)),
        cache.clone(),
        PollSettings::from_config(config),
    )
    .with_events(tx)
    .start();

    let mut queries = store.list();
    engine.send(Request::SyncQueries {
        queries: queries.clone(),
    });
    tracing::info!("gh-searches watching {} searches", queries.len());

    let options = SectionOptions {
        hide_empty: config.display.hide_empty,
    };
    let mut state_mtime = modified(state_path);

    loop {
        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(event) => {
                let id = event.query_id();
                if let Event::PollPaused { message, .. } = &event {
                    eprintln!("{id}: polling paused: {message}");
                }
                let current = sections(&queries, &cache, options);
                if let Some(section) = current.iter().find(|s| s.query.id == id) {
                    print_section(section, &config.display.date_format);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Pick up edits made by other invocations.
                let mtime = modified(state_path);
                if mtime != state_mtime {
                    state_mtime = mtime;
                    match QueryStore::load(state_path) {
                        Ok(store) => {
                            queries = store.list();
                            engine.send(Request::SyncQueries {
                                queries: queries.clone(),
                            });
                        }
                        Err(e) => eprintln!("ignoring unreadable saved searches: {e:#}"),
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn print_query(q: &SavedQuery, suffix: &str) {
    println!(
        "{:<28} {:<24} {} [{}]{suffix}",
        q.id.to_string(),
        q.title,
        q.query,
        q.scope
    );
}

fn print_results(records: &[PresentationRecord]) {
    if records.is_empty() {
        println!("no results");
    }
    for (i, record) in records.iter().enumerate() {
        print!("{:>3}. ", i + 1);
        print_record(record);
    }
}

fn print_record(record: &PresentationRecord) {
    println!("{}", record.title);
    println!("       {}", record.subtitle);
}

fn print_section(section: &Section, date_format: &str) {
    let updated = section
        .fetched_at
        .map(|t| format!(", updated {}", format_date(&t, date_format)))
        .unwrap_or_default();
    let more = if section.truncated { "+" } else { "" };
    println!(
        "== {} ({}{more}{updated})",
        section.query.title,
        section.records.len()
    );
    if let Some(warning) = &section.warning {
        println!("   ! stale: {warning}");
    }
    for record in &section.records {
        println!("   {}  {}", record.title, record.subtitle);
    }
}
