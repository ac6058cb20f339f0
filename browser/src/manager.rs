use crate::BrowserError;
use crate::Result;
use crate::config::BrowserConfig;
use crate::document::CdpDocument;
use chromiumoxide::Browser;
use chromiumoxide::BrowserConfig as CdpConfig;
use chromiumoxide::Handler;
use chromiumoxide::browser::HeadlessMode;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

async fn discover_ws_via_host_port(host: &str, port: u16) -> Result<String> {
    let url = format!("http://{host}:{port}/json/version");
    debug!("Requesting Chrome version info from: {}", url);

    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| BrowserError::CdpError(format!("Failed to build HTTP client: {e}")))?;

    let resp = client.get(&url).send().await.map_err(|e| {
        BrowserError::CdpError(format!("Failed to connect to Chrome debug port: {e}"))
    })?;

    if !resp.status().is_success() {
        return Err(BrowserError::CdpError(format!(
            "Chrome /json/version returned {}",
            resp.status()
        )));
    }

    let body: JsonVersion = resp.json().await.map_err(|e| {
        BrowserError::CdpError(format!("Failed to parse Chrome debug response: {e}"))
    })?;
    Ok(body.web_socket_debugger_url)
}

/// Picks the tab to drive among those of an attached Chrome: the first one
/// already on `host`, otherwise the first tab.
fn pick_tab(urls: &[Option<String>], host: Option<&str>) -> Option<usize> {
    if urls.is_empty() {
        return None;
    }
    let on_host = host.and_then(|host| {
        urls.iter().position(|url| {
            url.as_deref()
                .and_then(|u| url::Url::parse(u).ok())
                .and_then(|u| {
                    u.host_str()
                        .map(|h| h == host || h.ends_with(&format!(".{host}")))
                })
                .unwrap_or(false)
        })
    });
    Some(on_host.unwrap_or(0))
}

/// Owns the Chrome connection and the single tab the enforcer drives.
pub struct BrowserManager {
    config: BrowserConfig,
    browser: Arc<Mutex<Option<Browser>>>,
    page: Arc<Mutex<Option<Arc<CdpPage>>>>,
    event_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    navigation_monitor_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    user_data_dir: Arc<Mutex<Option<PathBuf>>>,
    cleanup_profile_on_drop: Arc<Mutex<bool>>,
}

impl BrowserManager {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
            page: Arc::new(Mutex::new(None)),
            event_task: Arc::new(Mutex::new(None)),
            navigation_monitor_handle: Arc::new(Mutex::new(None)),
            user_data_dir: Arc::new(Mutex::new(None)),
            cleanup_profile_on_drop: Arc::new(Mutex::new(false)),
        }
    }

    /// Attaches to the configured Chrome, or launches one.
    pub async fn start(&self) -> Result<()> {
        if self.browser.lock().await.is_some() {
            return Ok(());
        }

        if let Some(ws) = self.config.connect_ws.clone() {
            info!("Connecting to Chrome via WebSocket: {}", ws);
            return self.connect_with_retries(&ws).await;
        }

        if let Some(port) = self.config.connect_port {
            let host = self.config.connect_host.as_deref().unwrap_or("127.0.0.1");
            info!("Discovering Chrome WebSocket URL via {}:{}...", host, port);
            let started = tokio::time::Instant::now();
            let ws = loop {
                match discover_ws_via_host_port(host, port).await {
                    Ok(ws) => break ws,
                    Err(e) => {
                        if started.elapsed() > Duration::from_secs(15) {
                            return Err(BrowserError::CdpError(format!(
                                "Failed to discover Chrome WebSocket on port {port} within 15s: {e}"
                            )));
                        }
                        sleep(Duration::from_millis(300)).await;
                    }
                }
            };
            info!("WebSocket URL discovered in {:?}: {}", started.elapsed(), ws);
            return self.connect_with_retries(&ws).await;
        }

        self.launch().await
    }

    async fn connect_with_retries(&self, ws: &str) -> Result<()> {
        let attempt_timeout = Duration::from_millis(self.config.connect_attempt_timeout_ms);
        let attempts = self.config.connect_attempts.max(1);
        let mut last_err: Option<String> = None;

        for attempt in 1..=attempts {
            info!(
                "[cdp/bm] WS connect attempt {}/{} (timeout={}ms)",
                attempt,
                attempts,
                attempt_timeout.as_millis()
            );
            let ws_clone = ws.to_string();
            let handle = tokio::spawn(async move { Browser::connect(ws_clone).await });
            match tokio::time::timeout(attempt_timeout, handle).await {
                Ok(Ok(Ok((browser, handler)))) => {
                    info!("[cdp/bm] WS connect attempt {} succeeded", attempt);
                    self.install(browser, handler).await;
                    *self.cleanup_profile_on_drop.lock().await = false;
                    return Ok(());
                }
                Ok(Ok(Err(e))) => {
                    let msg = format!("CDP WebSocket connect failed: {e}");
                    warn!("[cdp/bm] {}", msg);
                    last_err = Some(msg);
                }
                Ok(Err(join_err)) => {
                    let msg = format!("Join error during connect attempt: {join_err}");
                    warn!("[cdp/bm] {}", msg);
                    last_err = Some(msg);
                }
                Err(_) => {
                    warn!(
                        "[cdp/bm] WS connect attempt {} timed out after {}ms",
                        attempt,
                        attempt_timeout.as_millis()
                    );
                }
            }
            sleep(Duration::from_millis(200)).await;
        }

        let base = "CDP WebSocket connect failed after all attempts".to_string();
        let msg = if let Some(e) = last_err {
            format!("{base}: {e}")
        } else {
            base
        };
        Err(BrowserError::CdpError(msg))
    }

    async fn launch(&self) -> Result<()> {
        info!("Launching new browser instance");
        let mut builder = CdpConfig::builder();

        let (user_data_path, is_temp_profile) = match &self.config.user_data_dir {
            Some(dir) => (dir.clone(), false),
            None => {
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis();
                let temp_path = std::env::temp_dir().join(format!(
                    "autoquality-browser-{}-{timestamp}",
                    std::process::id()
                ));
                if tokio::fs::metadata(&temp_path).await.is_ok() {
                    let _ = tokio::fs::remove_dir_all(&temp_path).await;
                }
                (temp_path, true)
            }
        };
        builder = builder.user_data_dir(&user_data_path);

        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = if self.config.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };

        builder = builder
            .window_size(self.config.window_width, self.config.window_height)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--autoplay-policy=no-user-gesture-required")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .request_timeout(Duration::from_secs(60));
        if let Some(user_agent) = &self.config.user_agent {
            builder = builder.arg(format!("--user-agent={user_agent}"));
        }

        let browser_config = builder.build().map_err(BrowserError::ConfigError)?;
        let (browser, handler) = Browser::launch(browser_config).await.map_err(|e| {
            BrowserError::CdpError(format!(
                "Failed to launch browser: {e}. Hint: ensure google-chrome or chromium is \
                 installed and on PATH, or set browser.chrome_path"
            ))
        })?;

        self.install(browser, handler).await;
        *self.user_data_dir.lock().await = Some(user_data_path);
        *self.cleanup_profile_on_drop.lock().await = is_temp_profile;
        Ok(())
    }

    async fn install(&self, browser: Browser, mut handler: Handler) {
        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {:?}", e);
                }
            }
        });
        *self.event_task.lock().await = Some(task);
        *self.browser.lock().await = Some(browser);
    }

    async fn ensure_browser(&self) -> Result<()> {
        let mut browser_guard = self.browser.lock().await;
        if let Some(browser) = browser_guard.as_ref() {
            match tokio::time::timeout(Duration::from_secs(2), browser.version()).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => {
                    warn!("Browser check failed: {}, will restart", e);
                    *browser_guard = None;
                }
                Err(_) => {
                    warn!("Browser check timed out, likely disconnected. Will restart");
                    *browser_guard = None;
                }
            }
        }
        drop(browser_guard);
        self.start().await
    }

    /// The tab being driven. Attached sessions reuse an open tab; launched
    /// ones open `start_url`.
    pub async fn get_or_create_page(&self) -> Result<Arc<CdpPage>> {
        self.ensure_browser().await?;

        let mut page_guard = self.page.lock().await;
        if let Some(page) = page_guard.as_ref() {
            match tokio::time::timeout(Duration::from_secs(2), page.url()).await {
                Ok(Ok(_)) => return Ok(Arc::clone(page)),
                Ok(Err(e)) => {
                    warn!("Existing page returned error: {}, will create new page", e);
                    *page_guard = None;
                }
                Err(_) => {
                    warn!("Existing page timed out checking URL; reusing it");
                    return Ok(Arc::clone(page));
                }
            }
        }

        let browser_guard = self.browser.lock().await;
        let browser = browser_guard.as_ref().ok_or(BrowserError::NotInitialized)?;

        let mut reused = None;
        if self.config.is_external() {
            let mut pages = browser.pages().await?;
            let mut urls = Vec::with_capacity(pages.len());
            for page in &pages {
                urls.push(page.url().await.ok().flatten());
            }
            let host = url::Url::parse(&self.config.start_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));
            if let Some(idx) = pick_tab(&urls, host.as_deref()) {
                info!(
                    "Driving existing tab: {}",
                    urls[idx].as_deref().unwrap_or("<unknown>")
                );
                reused = Some(pages.swap_remove(idx));
            }
        }

        let cdp_page = match reused {
            Some(page) => page,
            None => {
                info!("Opening new tab at {}", self.config.start_url);
                browser.new_page(self.config.start_url.as_str()).await?
            }
        };

        let page = Arc::new(cdp_page);
        *page_guard = Some(Arc::clone(&page));
        Ok(page)
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        let page = self.get_or_create_page().await?;
        page.goto(url).await?;
        Ok(())
    }

    pub async fn document(&self) -> Result<CdpDocument> {
        Ok(CdpDocument::new(self.get_or_create_page().await?))
    }

    /// Current page URL, the stream identifier used by the driver.
    pub async fn current_url(&self) -> Result<String> {
        let page = self.get_or_create_page().await?;
        page.url().await?.ok_or(BrowserError::PageNotLoaded)
    }

    /// Publishes the page URL on a watch channel whenever it changes.
    /// Replaces any previous monitor.
    pub async fn watch_navigation(&self) -> Result<watch::Receiver<String>> {
        let page = self.get_or_create_page().await?;
        let initial = page.url().await?.unwrap_or_default();
        let (tx, rx) = watch::channel(initial);

        self.stop_navigation_monitor().await;
        let interval = Duration::from_millis(self.config.navigation_poll_ms.max(50));
        let page_weak = Arc::downgrade(&page);
        let handle = tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if tx.is_closed() {
                    debug!("No navigation subscribers left, stopping monitor");
                    break;
                }
                let Some(page) = page_weak.upgrade() else {
                    debug!("Page dropped, stopping navigation monitor");
                    break;
                };
                match page.url().await {
                    Ok(Some(current_url)) if current_url != "about:blank" => {
                        tx.send_if_modified(|last_url| {
                            if *last_url == current_url {
                                return false;
                            }
                            info!(
                                "Navigation detected: {} -> {}",
                                if last_url.is_empty() { "initial" } else { last_url.as_str() },
                                current_url
                            );
                            *last_url = current_url;
                            true
                        });
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Reading page URL failed: {}", e),
                }
            }
        });

        *self.navigation_monitor_handle.lock().await = Some(handle);
        Ok(rx)
    }

    async fn stop_navigation_monitor(&self) {
        if let Some(handle) = self.navigation_monitor_handle.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn stop(&self) -> Result<()> {
        self.stop_navigation_monitor().await;
        *self.page.lock().await = None;

        let mut browser_guard = self.browser.lock().await;
        if let Some(mut browser) = browser_guard.take() {
            if self.config.is_external() {
                info!("Disconnecting from external Chrome (not closing it)");
            } else {
                info!("Stopping browser we launched");
                browser.close().await?;
                let _ = browser.wait().await;
            }
        }
        drop(browser_guard);

        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }

        if *self.cleanup_profile_on_drop.lock().await {
            if let Some(user_data_path) = self.user_data_dir.lock().await.take() {
                sleep(Duration::from_millis(500)).await;
                let _ = tokio::fs::remove_dir_all(&user_data_path).await;
            }
        }
        Ok(())
    }
}
