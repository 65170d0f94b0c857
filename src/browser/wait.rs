//! Condition-based waits with bounded timeouts.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::{BrowserError, BrowserResult, BrowserSession, Locator, WindowHandle};

/// Exponential poll interval, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { next: initial, max }
    }

    /// Delay before the next probe, never sleeping past `deadline`.
    pub fn next_delay(&mut self, deadline: Instant) -> Duration {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let delay = self.next.min(remaining);
        self.next = (self.next * 2).min(self.max);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_secs(1))
    }
}

/// First locator in the chain with at least one match, evaluated in order.
pub async fn first_match<S>(
    session: &mut S,
    chain: &[Locator],
) -> BrowserResult<Option<(usize, S::Element)>>
where
    S: BrowserSession + ?Sized,
{
    for (rank, locator) in chain.iter().enumerate() {
        match session.find_one(locator).await {
            Ok(Some(element)) => return Ok(Some((rank, element))),
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Locator {} failed: {}", locator, e),
        }
    }
    Ok(None)
}

/// Poll the chain until one locator matches or `timeout` elapses.
pub async fn wait_for_any<S>(
    session: &mut S,
    chain: &[Locator],
    timeout: Duration,
) -> BrowserResult<(usize, S::Element)>
where
    S: BrowserSession + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::default();

    loop {
        if let Some(found) = first_match(session, chain).await? {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            let what = chain
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(BrowserError::Timeout { what, timeout });
        }
        tokio::time::sleep(backoff.next_delay(deadline)).await;
    }
}

/// Poll for a single locator.
pub async fn wait_for<S>(
    session: &mut S,
    locator: &Locator,
    timeout: Duration,
) -> BrowserResult<S::Element>
where
    S: BrowserSession + ?Sized,
{
    wait_for_any(session, std::slice::from_ref(locator), timeout)
        .await
        .map(|(_, element)| element)
}

/// Poll for a window handle that is not in `known`.
///
/// Returns `None` when no new window shows up within `timeout`.
pub async fn wait_for_new_window<S>(
    session: &mut S,
    known: &[WindowHandle],
    timeout: Duration,
) -> BrowserResult<Option<WindowHandle>>
where
    S: BrowserSession + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::default();

    loop {
        let handles = session.window_handles().await?;
        if let Some(handle) = handles.into_iter().find(|h| !known.contains(h)) {
            return Ok(Some(handle));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(backoff.next_delay(deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(backoff.next_delay(deadline), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(deadline), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(deadline), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(deadline), Duration::from_millis(350));
    }

    #[test]
    fn backoff_never_sleeps_past_deadline() {
        let deadline = Instant::now();
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(deadline), Duration::ZERO);
    }
}
