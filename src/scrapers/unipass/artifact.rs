//! PDF capture of the open detail view through the site's print preview.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::selectors::PRINT_BUTTONS;
use crate::browser::{
    wait_for_any, wait_for_new_window, BrowserError, BrowserResult, BrowserSession, PdfOptions,
    WindowHandle,
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("Failed to write PDF: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF capture returned no data")]
    EmptyPayload,
}

impl CaptureError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Browser(e) if e.is_fatal())
    }
}

/// `case_<index>.pdf` inside `pdf_dir`.
pub fn artifact_path(pdf_dir: &Path, index: u64) -> PathBuf {
    pdf_dir.join(format!("case_{}.pdf", index))
}

/// Window context held while capturing.
///
/// Entering switches to the print preview window; [`WindowScope::restore`]
/// closes it and makes the origin window active again. Callers restore on
/// every exit path.
#[derive(Debug)]
struct WindowScope {
    origin: WindowHandle,
    entered: Option<WindowHandle>,
}

impl WindowScope {
    async fn open<S>(session: &mut S) -> BrowserResult<Self>
    where
        S: BrowserSession + ?Sized,
    {
        Ok(Self {
            origin: session.current_window().await?,
            entered: None,
        })
    }

    async fn enter<S>(&mut self, session: &mut S, handle: WindowHandle) -> BrowserResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        self.entered = Some(handle.clone());
        session.switch_to_window(&handle).await?;
        debug!("Switched to print window {}", handle);
        Ok(())
    }

    async fn restore<S>(self, session: &mut S) -> BrowserResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        if let Some(popup) = &self.entered {
            let on_popup = match session.current_window().await {
                Ok(current) => &current == popup,
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => false,
            };
            let closed = if on_popup {
                session.close_current_window().await
            } else {
                match session.switch_to_window(popup).await {
                    Ok(()) => session.close_current_window().await,
                    Err(e) => Err(e),
                }
            };
            match closed {
                Ok(()) => debug!("Closed print window {}", popup),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Could not close print window {}: {}", popup, e),
            }
        }

        if session.current_window().await.ok().as_ref() != Some(&self.origin) {
            session.switch_to_window(&self.origin).await?;
        }
        Ok(())
    }
}

/// Captures the detail view of a case as a PDF file.
#[derive(Debug, Clone)]
pub struct ArtifactCapturer {
    pdf_dir: PathBuf,
    timeout: Duration,
    popup_timeout: Duration,
    options: PdfOptions,
}

impl ArtifactCapturer {
    pub fn new(pdf_dir: impl Into<PathBuf>, timeout: Duration, popup_timeout: Duration) -> Self {
        Self {
            pdf_dir: pdf_dir.into(),
            timeout,
            popup_timeout,
            options: PdfOptions::a4_portrait(),
        }
    }

    /// Print the current case and write `case_<index>.pdf`.
    ///
    /// The print window is closed and the origin made active again on every
    /// outcome. Only a fatal restore error replaces the capture result; other
    /// restore errors are logged so a written PDF is still reported.
    pub async fn capture<S>(&self, session: &mut S, index: u64) -> Result<PathBuf, CaptureError>
    where
        S: BrowserSession + ?Sized,
    {
        let mut scope = WindowScope::open(session).await?;
        let result = self.capture_in_scope(session, &mut scope, index).await;
        let restored = scope.restore(session).await;

        match (result, restored) {
            (Err(e), _) if e.is_fatal() => Err(e),
            (_, Err(e)) if e.is_fatal() => Err(e.into()),
            (result, Err(e)) => {
                warn!("Case {}: could not restore origin window: {}", index, e);
                result
            }
            (result, Ok(())) => result,
        }
    }

    async fn capture_in_scope<S>(
        &self,
        session: &mut S,
        scope: &mut WindowScope,
        index: u64,
    ) -> Result<PathBuf, CaptureError>
    where
        S: BrowserSession + ?Sized,
    {
        let known = session.window_handles().await?;

        let (rank, button) = wait_for_any(session, &PRINT_BUTTONS, self.timeout).await?;
        debug!("Print button matched by strategy {}", rank + 1);
        session.click(&button).await?;

        match wait_for_new_window(session, &known, self.popup_timeout).await? {
            Some(popup) => scope.enter(session, popup).await?,
            None => debug!("No print window opened, capturing in place"),
        }

        let pdf = session.print_to_pdf(&self.options).await?;
        if pdf.is_empty() {
            return Err(CaptureError::EmptyPayload);
        }

        let path = artifact_path(&self.pdf_dir, index);
        tokio::fs::write(&path, &pdf).await?;
        info!("Saved PDF: {}", path.display());
        Ok(path)
    }
}
