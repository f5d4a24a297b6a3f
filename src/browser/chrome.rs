//! Chrome-backed page sessions via `chromiumoxide`.
//!
//! [`ChromeBrowser`] launches Chrome lazily on the first page request and
//! keeps it for the rest of the run. The top-level run owns it and calls
//! [`ChromeBrowser::close`] exactly once at the end, whatever happened
//! upstream.

use super::{BASELINE_SELECTOR, Browser, Page, USER_AGENT, VIEWPORT};
use crate::error::{PipelineError, Result};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, FrameId};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

/// How often the baseline element is polled for after navigation.
const SETTLE_POLL: Duration = Duration::from_millis(200);

/// Lifecycle event Chrome emits once a frame has had no network activity for 500ms.
const NETWORK_IDLE: &str = "networkIdle";

/// Whether a lifecycle event marks the main frame as network idle. Without a
/// known main frame any frame's idle event counts.
fn is_main_frame_idle(name: &str, frame: &FrameId, main_frame: Option<&FrameId>) -> bool {
    name == NETWORK_IDLE && main_frame.is_none_or(|main| main == frame)
}

/// Launch settings for the shared browser process.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Upper bound for navigation plus settling, per page load.
    pub navigation_timeout: Duration,
    /// Chrome binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            chrome_path: None,
            headless: true,
        }
    }
}

/// A launched Chrome process and its CDP event handler task.
///
/// The handler must be aborted when the browser goes away, otherwise it
/// keeps polling a dead websocket.
struct LaunchedBrowser {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

impl Drop for LaunchedBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Lazily launched, explicitly closed browser handle.
pub struct ChromeBrowser {
    settings: BrowserSettings,
    inner: Mutex<Option<LaunchedBrowser>>,
}

impl ChromeBrowser {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(None),
        }
    }

    /// Launch Chrome if it is not running yet.
    #[instrument(level = "info", skip_all)]
    pub async fn open(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        Ok(())
    }

    async fn launch(&self) -> Result<LaunchedBrowser> {
        let t0 = Instant::now();
        let (width, height) = VIEWPORT;

        let mut builder = BrowserConfig::builder()
            .request_timeout(self.settings.navigation_timeout)
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .no_sandbox()
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| PipelineError::Browser(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = CdpBrowser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Launched browser");
        Ok(LaunchedBrowser { browser, handler })
    }

    /// Shut the browser down. A no-op when it was never launched.
    #[instrument(level = "info", skip_all)]
    pub async fn close(&self) {
        let Some(mut launched) = self.inner.lock().await.take() else {
            debug!("Browser was never launched; nothing to close");
            return;
        };
        if let Err(e) = launched.browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
        if let Err(e) = launched.browser.wait().await {
            warn!(error = %e, "Waiting for browser exit failed");
        }
        info!("Browser closed");
    }
}

impl Browser for ChromeBrowser {
    type Page = ChromePage;

    async fn new_page(&self) -> Result<ChromePage> {
        self.open().await?;
        let page = {
            let guard = self.inner.lock().await;
            let launched = guard
                .as_ref()
                .ok_or_else(|| PipelineError::Browser("browser is not running".to_string()))?;
            launched.browser.new_page("about:blank").await?
        };

        // A page that fails configuration must still be released.
        let configured = page
            .set_user_agent(SetUserAgentOverrideParams::new(USER_AGENT))
            .await
            .map(|_| ());
        if let Err(e) = configured {
            let _ = page.close().await;
            return Err(e.into());
        }

        Ok(ChromePage {
            page: Some(page),
            navigation_timeout: self.settings.navigation_timeout,
        })
    }
}

/// One Chrome tab.
pub struct ChromePage {
    page: Option<CdpPage>,
    navigation_timeout: Duration,
}

impl ChromePage {
    fn page(&self) -> Result<&CdpPage> {
        self.page
            .as_ref()
            .ok_or_else(|| PipelineError::Browser("page already disposed".to_string()))
    }

    /// Navigate, wait for the main frame to go network idle, then poll until
    /// the baseline element shows up.
    async fn load(page: &CdpPage, url: &str) -> std::result::Result<(), String> {
        // Subscribe before navigating so the idle event cannot be missed.
        let mut lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| e.to_string())?;
        page.goto(url).await.map_err(|e| e.to_string())?;
        page.wait_for_navigation().await.map_err(|e| e.to_string())?;

        let main_frame = page.mainframe().await.map_err(|e| e.to_string())?;
        while let Some(event) = lifecycle.next().await {
            if is_main_frame_idle(&event.name, &event.frame_id, main_frame.as_ref()) {
                break;
            }
        }
        while page.find_element(BASELINE_SELECTOR).await.is_err() {
            sleep(SETTLE_POLL).await;
        }
        Ok(())
    }
}

impl Page for ChromePage {
    #[instrument(level = "info", skip(self), fields(timeout_ms = self.navigation_timeout.as_millis() as u64))]
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        let t0 = Instant::now();
        match timeout(self.navigation_timeout, Self::load(page, url)).await {
            Ok(Ok(())) => {
                debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Page settled");
                Ok(())
            }
            Ok(Err(reason)) => {
                error!(%url, error = %reason, "Navigation failed");
                Err(PipelineError::Navigation {
                    url: url.to_string(),
                    reason,
                })
            }
            Err(_) => {
                error!(%url, "Navigation timed out");
                Err(PipelineError::Navigation {
                    url: url.to_string(),
                    reason: format!("timed out after {:?}", self.navigation_timeout),
                })
            }
        }
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page()?.content().await?)
    }

    async fn dispose(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "Page close failed");
            }
        }
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            warn!("ChromePage dropped without dispose; closing in background");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
