//! chromiumoxide (CDP) implementation of [`BrowserSession`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::HandlerConfig;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::resource::{decode_data_url, is_inline};
use super::{
    BrowserEngineConfig, BrowserError, BrowserResult, BrowserSession, Locator, PdfOptions,
    WindowHandle,
};

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

fn map_cdp(err: CdpError) -> BrowserError {
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            BrowserError::SessionLost(err.to_string())
        }
        CdpError::NotFound => BrowserError::NotFound(err.to_string()),
        other => BrowserError::Protocol(other.to_string()),
    }
}

/// Find Chrome executable.
fn find_chrome() -> BrowserResult<PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(BrowserError::Launch(
        "Chrome/Chromium not found. Install it or set BROWSER_URL to a running instance"
            .to_string(),
    ))
}

/// A launched or attached Chrome with one active tab.
pub struct ChromiumSession {
    config: BrowserEngineConfig,
    browser: Browser,
    active: Page,
    http: reqwest::Client,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Launch a local browser, or attach to `remote_url` when configured.
    pub async fn launch(config: BrowserEngineConfig) -> BrowserResult<Self> {
        let (browser, handler) = match config.remote_url.clone() {
            Some(url) => Self::connect_remote(&config, &url).await?,
            None => Self::launch_local(&config).await?,
        };

        let active = browser.new_page("about:blank").await.map_err(map_cdp)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| BrowserError::Launch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            browser,
            active,
            http,
            handler,
        })
    }

    async fn launch_local(config: &BrowserEngineConfig) -> BrowserResult<(Browser, JoinHandle<()>)> {
        info!("Launching browser (headless={})", config.headless);

        let chrome_path = find_chrome()?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080);

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg(format!("--lang={}", config.lang))
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, task))
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(
        config: &BrowserEngineConfig,
        url: &str,
    ) -> BrowserResult<(Browser, JoinHandle<()>)> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, config.timeout
        );

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to reach remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| BrowserError::Launch(format!("Bad browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BrowserError::Launch("No webSocketDebuggerUrl in response".to_string()))?;

        info!("Connecting to WebSocket: {}", ws_url);

        let handler_config = HandlerConfig {
            request_timeout: Duration::from_secs(config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, task))
    }

    /// Close the browser and stop the CDP handler.
    pub async fn shutdown(mut self) {
        if self.config.remote_url.is_none() {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
        }
        self.handler.abort();
    }

    async fn wait_for_ready(&self) {
        let timeout = Duration::from_secs(self.config.timeout);
        match tokio::time::timeout(timeout, self.active.evaluate(WAIT_FOR_READY_SCRIPT.to_string())).await {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
    }

    async fn page_for(&self, handle: &WindowHandle) -> BrowserResult<Page> {
        let pages = self.browser.pages().await.map_err(map_cdp)?;
        pages
            .into_iter()
            .find(|p| p.target_id().inner() == &handle.0)
            .ok_or_else(|| BrowserError::UnknownWindow(handle.0.clone()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = Arc<Element>;

    async fn open(&mut self, url: &str) -> BrowserResult<()> {
        info!("Navigating to {}", url);
        let timeout = Duration::from_secs(self.config.timeout);
        tokio::time::timeout(timeout, self.active.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout {
                what: format!("navigation to {}", url),
                timeout,
            })?
            .map_err(map_cdp)?;
        self.wait_for_ready().await;
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<Self::Element>> {
        let found = match locator {
            Locator::Css(selector) => self.active.find_elements(selector.as_ref()).await,
            Locator::XPath(expression) => self.active.find_xpaths(expression.as_ref()).await,
        };
        match found {
            Ok(elements) => Ok(elements.into_iter().map(Arc::new).collect()),
            Err(e) => {
                let err = map_cdp(e);
                if err.is_fatal() {
                    return Err(err);
                }
                debug!("No match for {}: {}", locator, err);
                Ok(Vec::new())
            }
        }
    }

    async fn find_within(
        &mut self,
        parent: &Self::Element,
        css: &str,
    ) -> BrowserResult<Vec<Self::Element>> {
        match parent.find_elements(css).await {
            Ok(elements) => Ok(elements.into_iter().map(Arc::new).collect()),
            Err(e) => {
                let err = map_cdp(e);
                if err.is_fatal() {
                    return Err(err);
                }
                Ok(Vec::new())
            }
        }
    }

    async fn click(&mut self, element: &Self::Element) -> BrowserResult<()> {
        element.click().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn read_text(&mut self, element: &Self::Element) -> BrowserResult<String> {
        Ok(element
            .inner_text()
            .await
            .map_err(map_cdp)?
            .unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        element.attribute(name).await.map_err(map_cdp)
    }

    async fn select_option(&mut self, element: &Self::Element, value: &str) -> BrowserResult<()> {
        let quoted = serde_json::to_string(value)
            .map_err(|e| BrowserError::Protocol(format!("Unencodable option value: {}", e)))?;
        let script = format!(
            "function() {{ const v = {}; if (!Array.from(this.options || []).some(o => o.value === v)) return false; this.value = v; this.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }}",
            quoted
        );
        let returns = element.call_js_fn(script, false).await.map_err(map_cdp)?;
        let selected = returns
            .result
            .value
            .as_ref()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !selected {
            return Err(BrowserError::NotFound(format!("option {}", value)));
        }
        Ok(())
    }

    async fn window_handles(&mut self) -> BrowserResult<Vec<WindowHandle>> {
        let pages = self.browser.pages().await.map_err(map_cdp)?;
        Ok(pages
            .iter()
            .map(|p| WindowHandle(p.target_id().inner().clone()))
            .collect())
    }

    async fn current_window(&mut self) -> BrowserResult<WindowHandle> {
        Ok(WindowHandle(self.active.target_id().inner().clone()))
    }

    async fn switch_to_window(&mut self, handle: &WindowHandle) -> BrowserResult<()> {
        let page = self.page_for(handle).await?;
        page.bring_to_front().await.map_err(map_cdp)?;
        self.active = page;
        debug!("Switched to window {}", handle);
        Ok(())
    }

    async fn close_current_window(&mut self) -> BrowserResult<()> {
        let closing = self.active.clone();
        let closed = WindowHandle(closing.target_id().inner().clone());
        closing.close().await.map_err(map_cdp)?;

        // Park on any surviving tab until the caller switches explicitly.
        let pages = self.browser.pages().await.map_err(map_cdp)?;
        if let Some(page) = pages
            .into_iter()
            .find(|p| p.target_id().inner() != &closed.0)
        {
            self.active = page;
        }
        Ok(())
    }

    async fn print_to_pdf(&mut self, options: &PdfOptions) -> BrowserResult<Vec<u8>> {
        let params = PrintToPdfParams {
            print_background: Some(options.print_background),
            landscape: Some(options.landscape),
            paper_width: Some(options.paper_width),
            paper_height: Some(options.paper_height),
            margin_top: Some(options.margin_top),
            margin_bottom: Some(options.margin_bottom),
            margin_left: Some(options.margin_left),
            margin_right: Some(options.margin_right),
            ..Default::default()
        };
        self.active.pdf(params).await.map_err(|e| match map_cdp(e) {
            fatal @ BrowserError::SessionLost(_) => fatal,
            other => BrowserError::Capture(other.to_string()),
        })
    }

    async fn download_resource(&mut self, source: &str) -> BrowserResult<Vec<u8>> {
        if is_inline(source) {
            return decode_data_url(source).map(|payload| payload.data);
        }

        debug!("Downloading {}", source);
        let response = self
            .http
            .get(source)
            .send()
            .await
            .map_err(|e| BrowserError::Download(format!("{}: {}", source, e)))?;
        if !response.status().is_success() {
            return Err(BrowserError::Download(format!(
                "{}: HTTP {}",
                source,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrowserError::Download(format!("{}: {}", source, e)))?;
        Ok(bytes.to_vec())
    }
}
