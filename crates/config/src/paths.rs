//! Path utilities

use std::path::PathBuf;

/// Data directory (~/.benchpilot), falling back to the working directory
/// when no home is available.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".benchpilot"))
        .unwrap_or_else(|| PathBuf::from(".benchpilot"))
}

/// Config file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Bench workspace: waveform dumps and other measurement artefacts
pub fn workspace_path() -> PathBuf {
    data_dir().join("bench")
}

/// Conversation logs
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Expand a leading `~` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
