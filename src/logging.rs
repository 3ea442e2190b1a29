//! Diagnostic logging setup
//!
//! The terminal front-end owns stdout, so logs go to a file in the platform
//! data directory: XDG_DATA_HOME/kongossa-chat/logs/kongossa-chat.log on Linux.
//! Falls back to stderr if that file cannot be opened.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Filter used when RUST_LOG is not set
const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber. Returns the log file path if one is used.
pub fn init_logging() -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match open_log_file() {
        Ok((path, file)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            Some(path)
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(error = %e, "logging to stderr");
            None
        }
    }
}

fn open_log_file() -> Result<(PathBuf, fs::File), String> {
    let dir = get_log_directory()?;
    fs::create_dir_all(&dir).map_err(|e| format!("Failed to create log directory: {}", e))?;

    let path = dir.join("kongossa-chat.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file: {}", e))?;
    Ok((path, file))
}

/// Get the platform-specific log directory using XDG conventions
fn get_log_directory() -> Result<PathBuf, String> {
    let base = directories::BaseDirs::new().ok_or("Failed to determine home directory")?;
    Ok(base.data_dir().join("kongossa-chat").join("logs"))
}
