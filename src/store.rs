use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{BuiltinId, QueryId, SavedQuery, SearchScope};

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct BuiltinEntry {
    query: SavedQuery,
    hidden: bool,
}

impl BuiltinEntry {
    fn canonical(id: BuiltinId) -> Self {
        Self {
            query: SavedQuery::builtin(id),
            hidden: false,
        }
    }
}

/// The set of saved searches: the fixed built-ins followed by user searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStore {
    /// Always one entry per `BuiltinId`, in canonical order.
    builtins: Vec<BuiltinEntry>,
    custom: IndexMap<u64, SavedQuery>,
    next_custom_id: u64,
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryStore {
    /// A store holding only the canonical built-ins.
    pub fn new() -> Self {
        Self {
            builtins: BuiltinId::ALL
                .iter()
                .map(|&id| BuiltinEntry::canonical(id))
                .collect(),
            custom: IndexMap::new(),
            next_custom_id: 1,
        }
    }

    /// Add a user search against the issue search endpoint.
    pub fn add(&mut self, title: &str, query: &str) -> Result<SavedQuery, StoreError> {
        self.add_scoped(title, query, SearchScope::Issues)
    }

    pub fn add_scoped(
        &mut self,
        title: &str,
        query: &str,
        scope: SearchScope,
    ) -> Result<SavedQuery, StoreError> {
        let (title, query) = validate(title, query)?;
        if self.custom_title_taken(&title, None) {
            return Err(StoreError::DuplicateTitle(title));
        }
        let n = self.next_custom_id;
        self.next_custom_id += 1;
        let saved = SavedQuery {
            id: QueryId::Custom(n),
            title,
            query,
            scope,
        };
        self.custom.insert(n, saved.clone());
        Ok(saved)
    }

    /// Change the title and query of an existing search.
    ///
    /// Built-ins may be edited too; `restore_defaults` brings them back.
    pub fn update(
        &mut self,
        id: QueryId,
        title: &str,
        query: &str,
    ) -> Result<SavedQuery, StoreError> {
        let (title, query) = validate(title, query)?;
        match id {
            QueryId::Builtin(b) => {
                let entry = self.builtin_mut(b);
                entry.query.title = title;
                entry.query.query = query;
                Ok(entry.query.clone())
            }
            QueryId::Custom(n) => {
                if !self.custom.contains_key(&n) {
                    return Err(StoreError::NotFound(id));
                }
                if self.custom_title_taken(&title, Some(n)) {
                    return Err(StoreError::DuplicateTitle(title));
                }
                let saved = self.custom.get_mut(&n).ok_or(StoreError::NotFound(id))?;
                saved.title = title;
                saved.query = query;
                Ok(saved.clone())
            }
        }
    }

    /// Remove a user search. Built-ins can only be hidden.
    pub fn remove(&mut self, id: QueryId) -> Result<SavedQuery, StoreError> {
        match id {
            QueryId::Builtin(_) => Err(StoreError::CannotRemoveBuiltin(id)),
            // shift_remove keeps the insertion order of the remaining entries.
            QueryId::Custom(n) => self.custom.shift_remove(&n).ok_or(StoreError::NotFound(id)),
        }
    }

    pub fn hide(&mut self, id: QueryId) -> Result<(), StoreError> {
        self.set_hidden(id, true)
    }

    pub fn unhide(&mut self, id: QueryId) -> Result<(), StoreError> {
        self.set_hidden(id, false)
    }

    fn set_hidden(&mut self, id: QueryId, hidden: bool) -> Result<(), StoreError> {
        match id {
            QueryId::Builtin(b) => {
                self.builtin_mut(b).hidden = hidden;
                Ok(())
            }
            QueryId::Custom(n) if self.custom.contains_key(&n) => Err(StoreError::NotBuiltin(id)),
            QueryId::Custom(_) => Err(StoreError::NotFound(id)),
        }
    }

    /// Reset every built-in to its canonical title, query and scope, and make
    /// it visible again. User searches are left alone.
    pub fn restore_defaults(&mut self) {
        self.builtins = BuiltinId::ALL
            .iter()
            .map(|&id| BuiltinEntry::canonical(id))
            .collect();
    }

    /// Visible searches: built-ins first, then user searches in insertion order.
    pub fn list(&self) -> Vec<SavedQuery> {
        self.builtins
            .iter()
            .filter(|e| !e.hidden)
            .map(|e| e.query.clone())
            .chain(self.custom.values().cloned())
            .collect()
    }

    /// Built-ins currently hidden.
    pub fn hidden(&self) -> Vec<SavedQuery> {
        self.builtins
            .iter()
            .filter(|e| e.hidden)
            .map(|e| e.query.clone())
            .collect()
    }

    pub fn get(&self, id: QueryId) -> Option<&SavedQuery> {
        match id {
            QueryId::Builtin(_) => self.builtins.iter().map(|e| &e.query).find(|q| q.id == id),
            QueryId::Custom(n) => self.custom.get(&n),
        }
    }

    /// Look a search up by exact title, hidden built-ins included.
    ///
    /// User searches shadow built-ins of the same title.
    pub fn find_by_title(&self, title: &str) -> Option<&SavedQuery> {
        self.custom
            .values()
            .find(|q| q.title == title)
            .or_else(|| {
                self.builtins
                    .iter()
                    .map(|e| &e.query)
                    .find(|q| q.title == title)
            })
    }

    /// Visible searches whose title contains `text`, case-insensitively.
    pub fn matching(&self, text: &str) -> Vec<SavedQuery> {
        let needle = text.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|q| needle.is_empty() || q.title.to_lowercase().contains(&needle))
            .collect()
    }

    fn builtin_mut(&mut self, id: BuiltinId) -> &mut BuiltinEntry {
        let idx = BuiltinId::ALL
            .iter()
            .position(|&b| b == id)
            .unwrap_or_default();
        &mut self.builtins[idx]
    }

    fn custom_title_taken(&self, title: &str, except: Option<u64>) -> bool {
        self.custom
            .iter()
            .any(|(n, q)| Some(*n) != except && q.title == title)
    }
}

fn validate(title: &str, query: &str) -> Result<(String, String), StoreError> {
    let title = title.trim();
    let query = query.trim();
    if title.is_empty() {
        return Err(StoreError::EmptyField("title"));
    }
    if query.is_empty() {
        return Err(StoreError::EmptyField("query"));
    }
    Ok((title.to_owned(), query.to_owned()))
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// On-disk form of the store. Built-ins are only written when they differ
/// from their canonical form.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    /// Next id to hand out, so ids of removed searches are not reused.
    #[serde(default)]
    next_id: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    builtins: Vec<BuiltinState>,
    #[serde(default)]
    searches: Vec<CustomState>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuiltinState {
    id: BuiltinId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default)]
    hidden: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CustomState {
    /// Keeps `custom:N` ids stable across runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    title: String,
    query: String,
    #[serde(default)]
    scope: SearchScope,
}

impl QueryStore {
    /// Load the store from a TOML state file. A missing file yields the
    /// default store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let state: StateFile = toml::from_str(&contents)
            .with_context(|| format!("parsing TOML from {}", path.display()))?;
        Ok(Self::from_state(state))
    }

    /// Write the store to a TOML state file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&self.to_state()).context("serializing saved searches")?;
        std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        tracing::debug!("store: wrote saved searches to {}", path.display());
        Ok(())
    }

    fn from_state(state: StateFile) -> Self {
        let mut store = Self::new();
        for b in state.builtins {
            if b.title.is_some() || b.query.is_some() {
                let canonical = SavedQuery::builtin(b.id);
                let title = b.title.as_deref().unwrap_or(&canonical.title);
                let query = b.query.as_deref().unwrap_or(&canonical.query);
                if let Err(e) = store.update(QueryId::Builtin(b.id), title, query) {
                    tracing::warn!("store: ignoring override of {}: {e}", b.id.as_str());
                }
            }
            store.builtin_mut(b.id).hidden = b.hidden;
        }
        for s in state.searches {
            // Pinned ids stay as long as they keep increasing; anything else
            // gets a fresh one.
            if let Some(n) = s.id
                && n >= store.next_custom_id
            {
                store.next_custom_id = n;
            }
            if let Err(e) = store.add_scoped(&s.title, &s.query, s.scope) {
                tracing::warn!("store: skipping saved search {:?}: {e}", s.title);
            }
        }
        store.next_custom_id = store.next_custom_id.max(state.next_id);
        store
    }

    fn to_state(&self) -> StateFile {
        let builtins = self
            .builtins
            .iter()
            .filter_map(|e| {
                let QueryId::Builtin(id) = e.query.id else {
                    return None;
                };
                let canonical = SavedQuery::builtin(id);
                let title = (e.query.title != canonical.title).then(|| e.query.title.clone());
                let query = (e.query.query != canonical.query).then(|| e.query.query.clone());
                (title.is_some() || query.is_some() || e.hidden).then_some(BuiltinState {
                    id,
                    title,
                    query,
                    hidden: e.hidden,
                })
            })
            .collect();
        let searches = self
            .custom
            .iter()
            .map(|(n, q)| CustomState {
                id: Some(*n),
                title: q.title.clone(),
                query: q.query.clone(),
                scope: q.scope,
            })
            .collect();
        StateFile {
            next_id: self.next_custom_id,
            builtins,
            searches,
        }
    }
}
