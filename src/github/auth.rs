use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::error::SearchError;

/// Source of the token sent with every search request.
///
/// Called before each poll, so a provider that re-reads its source picks up
/// a fresh login without restarting the engine.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Result<String, SearchError>;
}

/// Token resolved through the gh CLI or the environment on every call.
#[derive(Debug, Clone)]
pub struct GhCliToken {
    host: String,
}

impl GhCliToken {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl CredentialProvider for GhCliToken {
    fn token(&self) -> Result<String, SearchError> {
        resolve_token(&self.host).map_err(|e| SearchError::Auth(format!("{e:#}")))
    }
}

/// A fixed token, for tests and for callers that manage credentials
/// themselves.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

impl CredentialProvider for StaticToken {
    fn token(&self) -> Result<String, SearchError> {
        if self.0.is_empty() {
            return Err(SearchError::Auth("empty token".to_owned()));
        }
        Ok(self.0.clone())
    }
}

/// Resolve a GitHub auth token for the given host.
///
/// Priority:
/// 1. `gh auth token --hostname {host}` (gh CLI)
/// 2. `GH_TOKEN` environment variable
/// 3. `GITHUB_TOKEN` environment variable
pub fn resolve_token(host: &str) -> Result<String> {
    if let Ok(token) = token_from_gh_cli(host) {
        return Ok(token);
    }

    for var in ["GH_TOKEN", "GITHUB_TOKEN"] {
        if let Ok(token) = std::env::var(var)
            && !token.is_empty()
        {
            return Ok(token);
        }
    }

    bail!(
        "no GitHub token found for host \"{host}\". \
         Run `gh auth login` or set GH_TOKEN / GITHUB_TOKEN."
    )
}

fn token_from_gh_cli(host: &str) -> Result<String> {
    let output = Command::new("gh")
        .args(["auth", "token", "--hostname", host])
        .output()
        .context("failed to run `gh auth token`")?;

    if !output.status.success() {
        bail!("gh auth token exited with non-zero status");
    }

    let token = String::from_utf8(output.stdout)
        .context("gh auth token produced non-UTF-8 output")?
        .trim()
        .to_owned();

    if token.is_empty() {
        bail!("gh auth token returned empty string");
    }

    Ok(token)
}
