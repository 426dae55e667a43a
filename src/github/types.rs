//! REST search response payloads and their conversion into domain items.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::types::{ItemDetail, ItemKind, ItemState, Reactions, RemoteItem, SearchScope};

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// One decoded page of search results.
#[derive(Debug)]
pub(crate) struct DecodedPage {
    pub items: Vec<RemoteItem>,
    pub total_count: u64,
    pub incomplete_results: bool,
}

/// Decode a search response body for the given scope.
pub(crate) fn decode_page(scope: SearchScope, body: &str) -> serde_json::Result<DecodedPage> {
    match scope {
        SearchScope::Issues => decode::<RawIssue>(body),
        SearchScope::Repositories => decode::<RawRepository>(body),
        SearchScope::Users => decode::<RawUser>(body),
    }
}

fn decode<T>(body: &str) -> serde_json::Result<DecodedPage>
where
    T: DeserializeOwned + Into<RemoteItem>,
{
    let response: SearchResponse<T> = serde_json::from_str(body)?;
    Ok(DecodedPage {
        items: response.items.into_iter().map(Into::into).collect(),
        total_count: response.total_count,
        incomplete_results: response.incomplete_results,
    })
}

// ---------------------------------------------------------------------------
// Raw items
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    html_url: String,
    #[serde(rename = "type", default)]
    account_type: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequestRef {
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReactions {
    #[serde(rename = "+1", default)]
    plus_one: u32,
    #[serde(rename = "-1", default)]
    minus_one: u32,
    #[serde(default)]
    laugh: u32,
    #[serde(default)]
    hooray: u32,
    #[serde(default)]
    confused: u32,
    #[serde(default)]
    heart: u32,
    #[serde(default)]
    rocket: u32,
    #[serde(default)]
    eyes: u32,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    node_id: String,
    number: u64,
    title: String,
    html_url: String,
    state: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    repository_url: String,
    user: Option<RawUser>,
    pull_request: Option<RawPullRequestRef>,
    reactions: Option<RawReactions>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    node_id: String,
    name: String,
    html_url: String,
    description: Option<String>,
    owner: Option<RawUser>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    forks_count: u32,
    #[serde(default)]
    open_issues_count: u32,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    has_discussions: bool,
    #[serde(default)]
    has_wiki: bool,
    updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// `https://api.github.com/repos/owner/name` → `owner/name`.
fn repo_from_api_url(url: &str) -> Option<String> {
    let mut segments = url.trim_end_matches('/').rsplit('/');
    let name = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    Some(format!("{owner}/{name}"))
}

impl From<RawIssue> for RemoteItem {
    fn from(raw: RawIssue) -> Self {
        let kind = if raw.pull_request.is_some() {
            ItemKind::PullRequest
        } else if raw.html_url.contains("/discussions/") {
            ItemKind::Discussion
        } else {
            ItemKind::Issue
        };
        let merged = raw
            .pull_request
            .as_ref()
            .is_some_and(|pr| pr.merged_at.is_some());
        let state = if merged {
            ItemState::Merged
        } else if raw.state.eq_ignore_ascii_case("closed") {
            ItemState::Closed
        } else {
            ItemState::Open
        };
        let r = raw.reactions.unwrap_or_default();
        Self {
            id: raw.node_id,
            kind,
            title: raw.title,
            url: raw.html_url,
            updated_at: raw.updated_at,
            state: Some(state),
            detail: ItemDetail::Issue {
                repo: repo_from_api_url(&raw.repository_url),
                number: raw.number,
                author: raw.user.map(|u| u.login),
                reactions: Reactions {
                    thumbs_up: r.plus_one,
                    thumbs_down: r.minus_one,
                    laugh: r.laugh,
                    hooray: r.hooray,
                    confused: r.confused,
                    heart: r.heart,
                    rocket: r.rocket,
                    eyes: r.eyes,
                },
            },
        }
    }
}

impl From<RawRepository> for RemoteItem {
    fn from(raw: RawRepository) -> Self {
        Self {
            id: raw.node_id,
            kind: ItemKind::Repository,
            title: raw.name,
            url: raw.html_url,
            updated_at: raw.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            state: Some(if raw.archived {
                ItemState::Archived
            } else {
                ItemState::Open
            }),
            detail: ItemDetail::Repository {
                owner: raw.owner.map(|o| o.login).unwrap_or_default(),
                description: raw.description.filter(|d| !d.is_empty()),
                stars: raw.stargazers_count,
                forks: raw.forks_count,
                open_issues: raw.open_issues_count,
                has_issues: raw.has_issues,
                has_discussions: raw.has_discussions,
                has_wiki: raw.has_wiki,
            },
        }
    }
}

impl From<RawUser> for RemoteItem {
    fn from(raw: RawUser) -> Self {
        let id = if raw.node_id.is_empty() {
            format!("user:{}", raw.login)
        } else {
            raw.node_id
        };
        let url = if raw.html_url.is_empty() {
            format!("https://github.com/{}", raw.login)
        } else {
            raw.html_url
        };
        Self {
            id,
            kind: ItemKind::User,
            title: raw.login,
            url,
            // The user search payload carries no timestamp.
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            state: None,
            detail: ItemDetail::User {
                account_type: raw.account_type,
            },
        }
    }
}
