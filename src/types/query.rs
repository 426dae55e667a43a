use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search scope
// ---------------------------------------------------------------------------

/// Which GitHub search endpoint a saved query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Issues,
    Repositories,
    Users,
}

impl SearchScope {
    /// Path segment under `/search/`, also the `type` parameter of the
    /// github.com search page.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::Repositories => "repositories",
            Self::Users => "users",
        }
    }

    /// Letter appended to the launcher trigger to pick this scope
    /// (`ghi`, `ghr`, `ghu`).
    pub fn trigger_suffix(self) -> char {
        match self {
            Self::Issues => 'i',
            Self::Repositories => 'r',
            Self::Users => 'u',
        }
    }

    pub fn from_trigger_suffix(c: char) -> Option<Self> {
        [Self::Issues, Self::Repositories, Self::Users]
            .into_iter()
            .find(|s| s.trigger_suffix() == c)
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The saved searches shipped by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinId {
    AssignedIssues,
    CreatedIssues,
    AssignedPullRequests,
    CreatedPullRequests,
    ReviewRequests,
    Mentions,
    RecentActivity,
    MyRepositories,
}

impl BuiltinId {
    /// Canonical order, which is also the display order.
    pub const ALL: [Self; 8] = [
        Self::AssignedIssues,
        Self::CreatedIssues,
        Self::AssignedPullRequests,
        Self::CreatedPullRequests,
        Self::ReviewRequests,
        Self::Mentions,
        Self::RecentActivity,
        Self::MyRepositories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssignedIssues => "assigned_issues",
            Self::CreatedIssues => "created_issues",
            Self::AssignedPullRequests => "assigned_pull_requests",
            Self::CreatedPullRequests => "created_pull_requests",
            Self::ReviewRequests => "review_requests",
            Self::Mentions => "mentions",
            Self::RecentActivity => "recent_activity",
            Self::MyRepositories => "my_repositories",
        }
    }

    /// Canonical `(title, query, scope)`.
    pub fn canonical(self) -> (&'static str, &'static str, SearchScope) {
        match self {
            Self::AssignedIssues => (
                "Assigned issues",
                "is:open is:issue assignee:@me",
                SearchScope::Issues,
            ),
            Self::CreatedIssues => (
                "Created issues",
                "is:open is:issue author:@me",
                SearchScope::Issues,
            ),
            Self::AssignedPullRequests => (
                "Assigned pull requests",
                "is:open is:pr assignee:@me",
                SearchScope::Issues,
            ),
            Self::CreatedPullRequests => (
                "Created pull requests",
                "is:open is:pr author:@me",
                SearchScope::Issues,
            ),
            Self::ReviewRequests => (
                "Review requests",
                "is:open is:pr review-requested:@me",
                SearchScope::Issues,
            ),
            Self::Mentions => ("Mentions", "mentions:@me", SearchScope::Issues),
            Self::RecentActivity => ("Recent activity", "involves:@me", SearchScope::Issues),
            Self::MyRepositories => (
                "My repositories",
                "sort:updated-desc fork:true user:@me",
                SearchScope::Repositories,
            ),
        }
    }
}

/// Identity of a saved search.
///
/// Built-in and user-defined searches live in disjoint id spaces so that
/// restoring defaults can never touch a custom entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryId {
    Builtin(BuiltinId),
    Custom(u64),
}

impl QueryId {
    pub fn is_builtin(self) -> bool {
        matches!(self, Self::Builtin(_))
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(b) => write!(f, "builtin:{}", b.as_str()),
            Self::Custom(n) => write!(f, "custom:{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Saved query
// ---------------------------------------------------------------------------

/// A named search query executed periodically against the GitHub search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedQuery {
    pub id: QueryId,
    pub title: String,
    /// Query in GitHub search syntax, e.g. `is:open is:pr review-requested:@me`.
    pub query: String,
    pub scope: SearchScope,
}

impl SavedQuery {
    /// The canonical form of a built-in search.
    pub fn builtin(id: BuiltinId) -> Self {
        let (title, query, scope) = id.canonical();
        Self {
            id: QueryId::Builtin(id),
            title: title.to_owned(),
            query: query.to_owned(),
            scope,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id.is_builtin()
    }

    /// Whether `other` would fetch the same results (title aside).
    pub fn same_search(&self, other: &Self) -> bool {
        self.query == other.query && self.scope == other.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique_and_ordered() {
        let mut sorted = BuiltinId::ALL.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), BuiltinId::ALL.len());
    }

    #[test]
    fn my_repositories_targets_repository_search() {
        let q = SavedQuery::builtin(BuiltinId::MyRepositories);
        assert_eq!(q.scope, SearchScope::Repositories);
        assert!(q.is_builtin());
    }

    #[test]
    fn query_id_display() {
        assert_eq!(
            QueryId::Builtin(BuiltinId::Mentions).to_string(),
            "builtin:mentions"
        );
        assert_eq!(QueryId::Custom(7).to_string(), "custom:7");
    }
}
