use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    PullRequest,
    Repository,
    User,
    Discussion,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Issue => "Issue",
            Self::PullRequest => "Pull request",
            Self::Repository => "Repository",
            Self::User => "User",
            Self::Discussion => "Discussion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Open,
    Closed,
    Merged,
    Archived,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Merged => "MERGED",
            Self::Archived => "ARCHIVED",
        }
    }
}

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub thumbs_up: u32,
    #[serde(default)]
    pub thumbs_down: u32,
    #[serde(default)]
    pub laugh: u32,
    #[serde(default)]
    pub hooray: u32,
    #[serde(default)]
    pub confused: u32,
    #[serde(default)]
    pub heart: u32,
    #[serde(default)]
    pub rocket: u32,
    #[serde(default)]
    pub eyes: u32,
}

impl Reactions {
    /// Total reaction count across all types.
    pub fn total(&self) -> u32 {
        self.thumbs_up
            + self.thumbs_down
            + self.laugh
            + self.hooray
            + self.confused
            + self.heart
            + self.rocket
            + self.eyes
    }

    /// `(emoji, count)` pairs in GitHub's display order.
    pub fn counts(&self) -> [(&'static str, u32); 8] {
        [
            ("👍", self.thumbs_up),
            ("👎", self.thumbs_down),
            ("😄", self.laugh),
            ("🎉", self.hooray),
            ("😕", self.confused),
            ("❤️", self.heart),
            ("🚀", self.rocket),
            ("👀", self.eyes),
        ]
    }
}

/// Kind-specific fields carried along for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemDetail {
    /// Issues, pull requests and discussions.
    Issue {
        /// `owner/name`
        repo: Option<String>,
        number: u64,
        author: Option<String>,
        reactions: Reactions,
    },
    Repository {
        owner: String,
        description: Option<String>,
        stars: u32,
        forks: u32,
        open_issues: u32,
        has_issues: bool,
        has_discussions: bool,
        has_wiki: bool,
    },
    User {
        /// `User` or `Organization`.
        account_type: String,
    },
}

// ---------------------------------------------------------------------------
// Remote item
// ---------------------------------------------------------------------------

/// One search hit.
///
/// `id` is GitHub's global node id, so it is stable across polls and unique
/// across kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    /// `None` for users.
    pub state: Option<ItemState>,
    pub detail: ItemDetail,
}

/// The current results of one saved search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    /// Ordered by `updated_at` descending, ties by `id` ascending.
    pub items: Vec<RemoteItem>,
    pub fetched_at: DateTime<Utc>,
    /// The per-cycle item cap was reached; more results exist remotely.
    pub truncated: bool,
}

/// Rate limit info extracted from `x-ratelimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}
