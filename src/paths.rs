//! Path resolution for stackform
//!
//! # Environment Variables
//!
//! - `STACKFORM_STATE_DIR` - Override the state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `--state-dir` flag (which clap also fills from `STACKFORM_STATE_DIR`)
//! 2. `XDG_STATE_HOME/stackform` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stackform`
//!    - macOS/Linux: `~/.local/state/stackform`
//!
//! Each stack keeps two files in the state directory: the local provider's
//! store (`<stack>.cloud.json`) and the record of the last run
//! (`<stack>.state.toml`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STACKFORM_STATE_DIR";

/// Resolve the state directory.
pub fn state_dir(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        let path = expand(&dir.to_string_lossy());
        log::debug!("Using state dir from flag or {ENV_STATE_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("stackform");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("stackform");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("stackform");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Local provider store for a stack
pub fn cloud_store(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(format!("{stack}.cloud.json"))
}

/// Run record for a stack
pub fn run_record(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(format!("{stack}.state.toml"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve `path` as written in a stack document: expanded, and relative to
/// the directory of the document when not absolute.
pub fn resolve_relative(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        return expanded;
    }
    match base.parent() {
        Some(dir) => dir.join(expanded),
        None => expanded,
    }
}

// ============================================================================
// Tests
// ============================================================================
