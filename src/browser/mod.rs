//! Browser automation interface.
//!
//! The scraper talks to the browser only through [`BrowserSession`], so the
//! pagination and extraction logic can run against chromiumoxide (CDP) in
//! production and against a scripted site in tests.

mod config;
#[cfg(feature = "browser")]
mod chromium;
pub mod resource;
pub mod wait;

pub use config::BrowserEngineConfig;
#[cfg(feature = "browser")]
pub use chromium::ChromiumSession;
pub use wait::{first_match, wait_for, wait_for_any, wait_for_new_window, Backoff};

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("Browser protocol error: {0}")]
    Protocol(String),
    #[error("Unknown window: {0}")]
    UnknownWindow(String),
    #[error("PDF capture failed: {0}")]
    Capture(String),
    #[error("Resource download failed: {0}")]
    Download(String),
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Browser session lost: {0}")]
    SessionLost(String),
}

impl BrowserError {
    /// Whether the session itself is unusable. Everything else is scoped to
    /// the current element, page or case.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::SessionLost(_) | BrowserError::Launch(_))
    }
}

pub type BrowserResult<T> = Result<T, BrowserError>;

/// How an element is located in the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(Cow<'static, str>),
    XPath(Cow<'static, str>),
}

impl Locator {
    pub const fn css(selector: &'static str) -> Self {
        Locator::Css(Cow::Borrowed(selector))
    }

    pub const fn xpath(expression: &'static str) -> Self {
        Locator::XPath(Cow::Borrowed(expression))
    }

    pub fn xpath_owned(expression: String) -> Self {
        Locator::XPath(Cow::Owned(expression))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// Opaque identifier of a browser window or tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub String);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for rendering the current document to PDF. Dimensions are in
/// inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub print_background: bool,
    pub landscape: bool,
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub margin_right: f64,
}

impl PdfOptions {
    /// ISO A4 portrait with backgrounds and 0.4in margins.
    pub fn a4_portrait() -> Self {
        Self {
            print_background: true,
            landscape: false,
            paper_width: 8.27,
            paper_height: 11.69,
            margin_top: 0.4,
            margin_bottom: 0.4,
            margin_left: 0.4,
            margin_right: 0.4,
        }
    }
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self::a4_portrait()
    }
}

/// One attended browser with a single active window context.
///
/// Calls are strictly sequential: the session tracks which window is active
/// and every element query runs against that window's document.
#[async_trait]
pub trait BrowserSession: Send {
    type Element: Clone + Send + Sync;

    /// Load a URL in the active window and wait for the document to be ready.
    async fn open(&mut self, url: &str) -> BrowserResult<()>;

    /// All elements matching the locator, in document order. An absent
    /// element is an empty vector, not an error.
    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<Self::Element>>;

    async fn find_one(&mut self, locator: &Locator) -> BrowserResult<Option<Self::Element>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// Descendants of `parent` matching a CSS selector.
    async fn find_within(
        &mut self,
        parent: &Self::Element,
        css: &str,
    ) -> BrowserResult<Vec<Self::Element>>;

    async fn click(&mut self, element: &Self::Element) -> BrowserResult<()>;

    async fn read_text(&mut self, element: &Self::Element) -> BrowserResult<String>;

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> BrowserResult<Option<String>>;

    async fn select_option(&mut self, element: &Self::Element, value: &str) -> BrowserResult<()>;

    async fn window_handles(&mut self) -> BrowserResult<Vec<WindowHandle>>;

    async fn current_window(&mut self) -> BrowserResult<WindowHandle>;

    async fn switch_to_window(&mut self, handle: &WindowHandle) -> BrowserResult<()>;

    /// Close the active window. The caller must switch to another window
    /// before issuing further queries.
    async fn close_current_window(&mut self) -> BrowserResult<()>;

    /// Render the active document to PDF and return the decoded bytes.
    async fn print_to_pdf(&mut self, options: &PdfOptions) -> BrowserResult<Vec<u8>>;

    /// Fetch a binary resource by absolute URL or inline `data:` payload.
    async fn download_resource(&mut self, source: &str) -> BrowserResult<Vec<u8>>;
}
