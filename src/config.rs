use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

// Default configuration
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Server routes, with `{conversation}` / `{message}` placeholders
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub new_messages: String,
    pub history: String,
    pub send: String,
    pub mark_read: String,
    pub unread_count: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            new_messages: "/chat/{conversation}/new-messages/".to_string(),
            history: "/chat/{conversation}/messages/".to_string(),
            send: "/chat/{conversation}/send/".to_string(),
            mark_read: "/chat/messages/{message}/read/".to_string(),
            unread_count: "/chat/unread-count/".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub current_user_id: i64,
    pub display_name: String,
    /// Raw `Cookie` header (e.g. `sessionid=...`), obtained by logging in elsewhere
    pub session_cookie: Option<String>,
    pub csrf_token: Option<String>,
    pub poll_interval_ms: u64,
    pub page_size: usize,
    /// Left unset, requests rely on the transport's own timeouts
    pub request_timeout_secs: Option<u64>,
    pub last_conversation: Option<i64>,
    pub endpoints: Endpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER.to_string(),
            current_user_id: 0,
            display_name: "me".to_string(),
            session_cookie: None,
            csrf_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: None,
            last_conversation: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

pub fn settings_path() -> Option<PathBuf> {
    if let Some(proj) = ProjectDirs::from("com", "kongossa", "kongossa-chat") {
        let dir = proj.config_dir();
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::warn!(error = %e, "failed to create config dir");
            return None;
        }
        return Some(dir.join("settings.json"));
    }
    None
}

pub fn load_settings() -> Option<Settings> {
    let path = settings_path()?;
    let content = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "ignoring unreadable settings file");
            None
        }
    }
}

pub fn save_settings(settings: &Settings) -> std::io::Result<()> {
    if let Some(path) = settings_path() {
        let mut file = fs::File::create(path)?;
        let data = serde_json::to_string_pretty(settings)?;
        file.write_all(data.as_bytes())?;
    }
    Ok(())
}
