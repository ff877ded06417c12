//! Centralized home-based storage paths for all expense-tracker persistence.
//!
//! Everything lives under `~/.expense-tracker/`:
//! - `config.yaml` - Client configuration
//! - `storage/` - Durable key/value entries (credentials, user)
//! - `logs/events.jsonl` - Structured event log
//!
//! `EXPENSE_TRACKER_HOME` replaces `~/.expense-tracker` entirely.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the expense tracker directory.
const EXPENSE_TRACKER_DIR: &str = ".expense-tracker";

/// Overrides the home-based directory.
pub const HOME_ENV: &str = "EXPENSE_TRACKER_HOME";

/// Returns the tracker directory: `~/.expense-tracker/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn tracker_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for expense tracker storage")?
            .join(EXPENSE_TRACKER_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create tracker directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the config file path: `~/.expense-tracker/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(tracker_home_dir()?.join("config.yaml"))
}

/// Returns the durable storage directory: `~/.expense-tracker/storage/`
///
/// Creates the directory if it doesn't exist.
pub fn storage_dir() -> Result<PathBuf> {
    let dir = tracker_home_dir()?.join("storage");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the logs directory: `~/.expense-tracker/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = tracker_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}
