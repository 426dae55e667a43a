use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::types::AppConfig;

const APP_DIR: &str = "gh-searches";
const STATE_FILE: &str = "searches.toml";

/// Discover and load the app config.
///
/// Priority:
/// 1. `--config` flag (explicit path, must exist)
/// 2. `$GH_SEARCHES_CONFIG` environment variable
/// 3. `$XDG_CONFIG_HOME/gh-searches/config.toml`
/// 4. `~/.config/gh-searches/config.toml`
///
/// Falls back to defaults when nothing is found.
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_global_config(),
    };
    match path {
        Some(path) => read_config(&path),
        None => Ok(AppConfig::default()),
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML from {}", path.display()))?;

    // A relative state path is relative to the config file.
    if let Some(state) = config.state_path.take() {
        let state = expand_tilde(&state.to_string_lossy());
        config.state_path = Some(match path.parent() {
            Some(dir) if state.is_relative() => dir.join(state),
            _ => state,
        });
    } else if let Some(dir) = path.parent() {
        config.state_path = Some(dir.join(STATE_FILE));
    }
    Ok(config)
}

/// Where saved searches are persisted.
///
/// `config.state_path` if set, else `searches.toml` in the config directory.
pub fn resolve_state_path(config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = &config.state_path {
        return Ok(path.clone());
    }
    config_dir()
        .map(|dir| dir.join(STATE_FILE))
        .context("cannot locate a config directory: set HOME or XDG_CONFIG_HOME")
}

fn find_global_config() -> Option<PathBuf> {
    // $GH_SEARCHES_CONFIG
    if let Ok(path) = std::env::var("GH_SEARCHES_CONFIG") {
        let p = PathBuf::from(&path);
        if p.is_file() {
            return Some(p);
        }
    }

    let p = config_dir()?.join("config.toml");
    p.is_file().then_some(p)
}

/// `$XDG_CONFIG_HOME/gh-searches`, else `~/.config/gh-searches`.
fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join(APP_DIR));
    }
    dirs_fallback().map(|home| home.join(".config").join(APP_DIR))
}

fn dirs_fallback() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs_fallback()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}
