//! Mapping of search results and saved searches into launcher entries.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::cache::ResultCache;
use crate::types::{ItemDetail, PollState, RemoteItem, SavedQuery, SearchScope};
use crate::util::expand_emoji;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// What running an action does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    /// Open the URL in the browser.
    OpenUrl(String),
    /// Put this text into the launcher's input.
    ShowQuery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: &'static str,
    pub label: &'static str,
    pub target: ActionTarget,
}

impl Action {
    fn open(id: &'static str, label: &'static str, url: String) -> Self {
        Self {
            id,
            label,
            target: ActionTarget::OpenUrl(url),
        }
    }
}

/// A launchable entry. The first action is the primary one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationRecord {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub actions: Vec<Action>,
}

impl PresentationRecord {
    pub fn primary_action(&self) -> Option<&Action> {
        self.actions.first()
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Map a search hit to a launcher entry.
pub fn present(item: &RemoteItem) -> PresentationRecord {
    let mut actions = vec![Action::open("open", "Show on GitHub", item.url.clone())];

    let subtitle = match &item.detail {
        ItemDetail::Issue {
            repo,
            number,
            reactions,
            ..
        } => {
            let mut s = item
                .state
                .map_or_else(|| item.kind.label().to_uppercase(), |st| st.as_str().to_owned());
            if reactions.total() > 0 {
                s.push_str(" ·");
                for (emoji, count) in reactions.counts() {
                    if count > 0 {
                        let _ = write!(s, " {emoji}{count}");
                    }
                }
            }
            match repo {
                Some(repo) => {
                    let _ = write!(s, " · {repo} #{number}");
                }
                None => {
                    let _ = write!(s, " · #{number}");
                }
            }
            s
        }
        ItemDetail::Repository {
            owner,
            description,
            stars,
            forks,
            open_issues,
            has_issues,
            has_discussions,
            has_wiki,
        } => {
            let base = item.url.trim_end_matches('/');
            if *has_issues {
                actions.push(Action::open("open-issues", "Open issues", format!("{base}/issues")));
                actions.push(Action::open(
                    "open-pulls",
                    "Open pull requests",
                    format!("{base}/pulls"),
                ));
            }
            if *has_discussions {
                actions.push(Action::open(
                    "open-discussions",
                    "Open discussions",
                    format!("{base}/discussions"),
                ));
            }
            if *has_wiki {
                actions.push(Action::open("open-wiki", "Open wiki", format!("{base}/wiki")));
            }

            let mut s = owner.clone();
            for (symbol, count) in [("✨", stars), ("🍴", forks), ("⚠️", open_issues)] {
                if *count > 0 {
                    let _ = write!(s, " {symbol}{count}");
                }
            }
            if let Some(desc) = description {
                let _ = write!(s, " · {}", expand_emoji(desc));
            }
            s
        }
        ItemDetail::User { account_type } => account_type.clone(),
    };

    PresentationRecord {
        id: item.id.clone(),
        title: expand_emoji(&item.title).into_owned(),
        subtitle,
        actions,
    }
}

// ---------------------------------------------------------------------------
// Saved searches
// ---------------------------------------------------------------------------

/// URL of the web search page for a saved search.
pub fn web_search_url(host: &str, query: &SavedQuery) -> String {
    let mut url = format!(
        "https://{host}/search?q={}",
        urlencoding::encode(&query.query)
    );
    if query.scope != SearchScope::Issues {
        let _ = write!(url, "&type={}", query.scope.endpoint());
    }
    url
}

/// Launcher input that runs `query` against `scope`: the trigger with the
/// scope letter, then the query, e.g. `ghr language:rust `.
pub fn launcher_input(trigger: &str, scope: SearchScope, query: &str) -> String {
    format!("{}{} {} ", trigger.trim(), scope.trigger_suffix(), query.trim())
}

/// Split launcher input back into scope and query.
///
/// Returns `None` when `input` does not start with `trigger` followed by a
/// scope letter and whitespace. The query may be empty.
pub fn parse_launcher_input<'a>(
    input: &'a str,
    trigger: &str,
) -> Option<(SearchScope, &'a str)> {
    let rest = input.trim_start().strip_prefix(trigger.trim())?;
    let mut chars = rest.chars();
    let scope = SearchScope::from_trigger_suffix(chars.next()?)?;
    let query = chars.as_str();
    if !query.is_empty() && !query.starts_with(char::is_whitespace) {
        return None;
    }
    Some((scope, query.trim()))
}

/// Launcher entry for a saved search itself.
///
/// "Show" fills the launcher input with the scope trigger followed by the
/// query, "Show on GitHub" opens the web search.
pub fn present_saved_query(query: &SavedQuery, trigger: &str, host: &str) -> PresentationRecord {
    let input = launcher_input(trigger, query.scope, &query.query);
    PresentationRecord {
        id: query.id.to_string(),
        title: query.title.clone(),
        subtitle: input.trim_end().to_owned(),
        actions: vec![
            Action {
                id: "show",
                label: "Show",
                target: ActionTarget::ShowQuery(input),
            },
            Action::open("github", "Show on GitHub", web_search_url(host, query)),
        ],
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The current entries of one saved search.
#[derive(Debug, Clone)]
pub struct Section {
    pub query: SavedQuery,
    pub records: Vec<PresentationRecord>,
    /// `None` until the first successful poll.
    pub fetched_at: Option<DateTime<Utc>>,
    pub truncated: bool,
    /// Set when the last poll failed; `records` are then stale.
    pub warning: Option<String>,
    pub poll: PollState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionOptions {
    /// Drop searches whose last successful poll found nothing.
    pub hide_empty: bool,
}

/// One section per saved search, in `queries` order.
pub fn sections(
    queries: &[SavedQuery],
    cache: &ResultCache,
    options: SectionOptions,
) -> Vec<Section> {
    queries
        .iter()
        .filter_map(|query| {
            let snapshot = cache.snapshot(query.id);
            let poll = cache.poll_state(query.id).unwrap_or_default();
            if options.hide_empty && snapshot.as_ref().is_some_and(|s| s.items.is_empty()) {
                return None;
            }
            let warning = poll
                .last_error
                .as_ref()
                .filter(|_| poll.is_stale())
                .map(|e| e.message.clone());
            Some(Section {
                query: query.clone(),
                records: snapshot
                    .as_ref()
                    .map(|s| s.items.iter().map(present).collect())
                    .unwrap_or_default(),
                fetched_at: snapshot.as_ref().map(|s| s.fetched_at),
                truncated: snapshot.as_ref().is_some_and(|s| s.truncated),
                warning,
                poll,
            })
        })
        .collect()
}
