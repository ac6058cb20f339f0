use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Launch Chrome in headless mode. Headed by default so the stream is
    /// actually watchable.
    #[serde(default)]
    pub headless: bool,

    /// Connect to an already-running Chrome DevTools WS endpoint
    /// e.g. ws://127.0.0.1:9222/devtools/browser/XXXXXXXX
    #[serde(default)]
    pub connect_ws: Option<String>,

    /// Or discover the WS endpoint from a --remote-debugging-port (e.g. 9222).
    #[serde(default)]
    pub connect_port: Option<u16>,

    /// Host used with `connect_port`. Defaults to 127.0.0.1.
    #[serde(default)]
    pub connect_host: Option<String>,

    /// Per-attempt timeout for WS connect to Chrome (milliseconds)
    #[serde(default = "default_connect_attempt_timeout_ms")]
    pub connect_attempt_timeout_ms: u64,

    /// Number of WS connect attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Use a persistent profile instead of temp. A configured profile is
    /// never deleted; it keeps the platform login between runs.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,

    /// Chrome/Chromium binary. Auto-detected when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Page opened when a new tab is created.
    #[serde(default = "default_start_url")]
    pub start_url: String,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// How often the page URL is sampled for stream changes.
    #[serde(default = "default_navigation_poll_ms")]
    pub navigation_poll_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            connect_ws: None,
            connect_port: None,
            connect_host: None,
            connect_attempt_timeout_ms: default_connect_attempt_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            user_data_dir: None,
            chrome_path: None,
            user_agent: None,
            start_url: default_start_url(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            navigation_poll_ms: default_navigation_poll_ms(),
        }
    }
}

impl BrowserConfig {
    /// Whether we attach to a Chrome someone else started.
    pub fn is_external(&self) -> bool {
        self.connect_ws.is_some() || self.connect_port.is_some()
    }
}

fn default_connect_attempt_timeout_ms() -> u64 {
    3000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_start_url() -> String {
    "https://www.twitch.tv/".to_string()
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_navigation_poll_ms() -> u64 {
    500
}
