use chromiumoxide::cdp::browser_protocol::page::EventJavascriptDialogOpening;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

type CdpResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How many times to look for existing tabs right after attaching.
const PAGE_DISCOVERY_ATTEMPTS: u32 = 5;
const PAGE_DISCOVERY_DELAY: Duration = Duration::from_millis(200);

/// Where the browser comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectMode {
    /// Start a private Chromium.
    Launch { visible: bool },
    /// Attach to a running browser's DevTools endpoint, e.g. `http://127.0.0.1:9222`
    /// or a `ws://` debugger URL. The browser is left running on close.
    Connect { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    mode: ConnectMode,
    user_data_dir: Option<PathBuf>,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn open(mode: &ConnectMode, home_url: &str) -> CdpResult<Self> {
        match mode {
            ConnectMode::Launch { visible } => Self::launch(*visible, home_url).await,
            ConnectMode::Connect { endpoint } => Self::connect(endpoint, home_url).await,
        }
    }

    pub fn mode(&self) -> &ConnectMode {
        &self.mode
    }

    pub async fn launch(visible: bool, home_url: &str) -> CdpResult<Self> {
        let mut config_builder = BrowserConfig::builder();
        config_builder = config_builder.no_sandbox();
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder.user_data_dir(&user_data_dir);

        if visible {
            tracing::info!("Launching browser in visible mode");
            config_builder = config_builder.with_head();
        } else {
            tracing::info!("Launching browser in headless mode");
        }

        if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            tracing::info!("Using custom Chrome binary: {}", chrome_bin);
            config_builder = config_builder.chrome_executable(chrome_bin);
        }

        let (browser, handler) = Browser::launch(
            config_builder
                .build()
                .map_err(|e| format!("Failed to build browser config: {}", e))?,
        )
        .await
        .map_err(|e| format!("Failed to launch browser: {}", e))?;
        let handler_task = spawn_handler(handler);

        let page = browser
            .new_page(home_url)
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;
        attach_listeners(&page).await?;

        Ok(Self {
            browser,
            handler_task,
            page,
            mode: ConnectMode::Launch { visible },
            user_data_dir: Some(user_data_dir),
            cleanup_user_data_dir,
        })
    }

    /// Attach to a running browser and pick the tab already showing `home_url`,
    /// opening one if none is.
    pub async fn connect(endpoint: &str, home_url: &str) -> CdpResult<Self> {
        let ws_url = resolve_ws_url(endpoint).await?;
        tracing::info!("Connecting to browser at {}", ws_url);

        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| format!("Failed to connect to browser: {}", e))?;
        let handler_task = spawn_handler(handler);

        let page = match find_page(&browser, home_url).await {
            Some(page) => page,
            None => {
                tracing::info!("No open tab for {}, opening one", home_url);
                browser
                    .new_page(home_url)
                    .await
                    .map_err(|e| format!("Failed to create page: {}", e))?
            }
        };
        attach_listeners(&page).await?;

        Ok(Self {
            browser,
            handler_task,
            page,
            mode: ConnectMode::Connect {
                endpoint: endpoint.to_string(),
            },
            user_data_dir: None,
            cleanup_user_data_dir: false,
        })
    }

    pub async fn close(mut self) -> CdpResult<()> {
        match self.mode {
            ConnectMode::Launch { .. } => {
                self.browser
                    .close()
                    .await
                    .map_err(|e| format!("Error closing browser: {}", e))?;
                self.handler_task
                    .await
                    .map_err(|e| format!("Error awaiting handler: {}", e))?;
            }
            // Someone else's browser; only drop our connection.
            ConnectMode::Connect { .. } => self.handler_task.abort(),
        }

        if self.cleanup_user_data_dir
            && let Some(dir) = &self.user_data_dir
            && let Err(e) = std::fs::remove_dir_all(dir)
        {
            tracing::debug!("Failed to clean up user-data-dir {}: {}", dir.display(), e);
        }

        Ok(())
    }
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                tracing::error!("Browser handler error (ignoring): {}", e);
                continue;
            }
        }
        tracing::info!("Browser handler task ended");
    })
}

/// Forward console output to tracing and auto-accept JavaScript dialogs,
/// which would otherwise block every probe call.
async fn attach_listeners(page: &Page) -> CdpResult<()> {
    let mut console_events = page
        .event_listener::<chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled>()
        .await
        .map_err(|e| format!("Failed to subscribe to console events: {}", e))?;

    tokio::spawn(async move {
        while let Some(event) = console_events.next().await {
            let args_str: Vec<String> = event
                .args
                .iter()
                .map(|arg| {
                    arg.description
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string())
                })
                .collect();
            tracing::debug!(
                "Browser Console [{:?}]: {}",
                event.r#type,
                args_str.join(" ")
            );
        }
    });

    let mut dialog_events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| format!("Failed to subscribe to dialog events: {}", e))?;

    let page_clone = page.clone();
    tokio::spawn(async move {
        while let Some(event) = dialog_events.next().await {
            tracing::info!(
                "Handling JavaScript Dialog: {} ({:?})",
                event.message,
                event.r#type
            );
            let cmd =
                chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams::new(true);
            if let Err(e) = page_clone.execute(cmd).await {
                tracing::error!("Failed to handle/accept dialog: {}", e);
            }
        }
    });

    Ok(())
}

async fn find_page(browser: &Browser, home_url: &str) -> Option<Page> {
    let prefix = home_url.trim_end_matches('/');
    for attempt in 0..PAGE_DISCOVERY_ATTEMPTS {
        match browser.pages().await {
            Ok(pages) => {
                for page in pages {
                    let url = page.url().await.ok().flatten().unwrap_or_default();
                    if url.starts_with(prefix) {
                        tracing::info!("Attached to open tab {}", url);
                        return Some(page);
                    }
                }
            }
            Err(e) => tracing::debug!("Listing pages failed (attempt {}): {}", attempt + 1, e),
        }
        tokio::time::sleep(PAGE_DISCOVERY_DELAY).await;
    }
    None
}

/// Accept either a websocket debugger URL or an HTTP DevTools endpoint.
async fn resolve_ws_url(endpoint: &str) -> CdpResult<String> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Ok(endpoint.to_string());
    }
    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let info: VersionInfo = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("DevTools endpoint {} unreachable: {}", url, e))?
        .json()
        .await
        .map_err(|e| format!("Unexpected reply from {}: {}", url, e))?;
    Ok(info.web_socket_debugger_url)
}

fn resolve_user_data_dir() -> CdpResult<(PathBuf, bool)> {
    if let Ok(dir) = std::env::var("CHATDRIVE_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!(
            "Using user data dir from CHATDRIVE_USER_DATA_DIR: {}",
            path.display()
        );
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("System clock error: {}", e))?
        .as_nanos();
    let unique = format!("chatdrive-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::info!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
