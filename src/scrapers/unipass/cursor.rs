//! Page cursor over the grouped pager.
//!
//! Pages come in groups of [`GROUP_SIZE`]. Inside a group a page is
//! addressed by its number; the first page of every later group is only
//! reachable through the "next 10 pages" control.

use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::listing::listing_signature;
use super::selectors::{page_link, NEXT_GROUP, PAGINATION_LINKS, TOTAL_COUNT};
use crate::browser::{wait_for_any, Backoff, BrowserError, BrowserResult, BrowserSession, Locator};

pub const GROUP_SIZE: u32 = 10;

static COUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("static pattern"));

/// Navigation needed to reach the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Click the numbered link inside the current group.
    GotoPage(u32),
    /// Click "next 10 pages", landing on `first_page`.
    NextGroup { first_page: u32 },
}

impl Transition {
    /// Transition from `current` to `current + 1`.
    pub fn after(current: u32) -> Self {
        let next = current + 1;
        if (next - 1) % GROUP_SIZE == 0 && next > 1 {
            Transition::NextGroup { first_page: next }
        } else {
            Transition::GotoPage(next)
        }
    }

    pub fn target(&self) -> u32 {
        match *self {
            Transition::GotoPage(page) => page,
            Transition::NextGroup { first_page } => first_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    current_page: u32,
    total_pages: u32,
}

impl PageCursor {
    pub fn new(total_pages: u32) -> Self {
        Self {
            current_page: 1,
            total_pages: total_pages.max(1),
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn current_group(&self) -> u32 {
        (self.current_page - 1) / GROUP_SIZE + 1
    }

    pub fn is_done(&self) -> bool {
        self.current_page > self.total_pages
    }

    /// Move one page forward, whether or not the browser follows.
    ///
    /// Returns the transition to perform, or `None` once the cursor has moved
    /// past the last page.
    pub fn advance(&mut self) -> Option<Transition> {
        let transition = Transition::after(self.current_page);
        self.current_page = transition.target();
        (!self.is_done()).then_some(transition)
    }

    /// Whether the current page opens a new group (11, 21, ...).
    pub fn at_group_start(&self) -> bool {
        self.current_page % GROUP_SIZE == 1 && self.current_page > 1
    }
}

/// Page count implied by a "total N" text, ten cases per page.
pub fn pages_for_count_text(text: &str) -> Option<u32> {
    let digits = COUNT_PATTERN.find(text)?.as_str().replace(',', "");
    let count: u64 = digits.parse().ok()?;
    let pages = count.div_ceil(u64::from(GROUP_SIZE)).max(1);
    u32::try_from(pages).ok()
}

async fn max_page_label<S>(session: &mut S) -> BrowserResult<Option<u32>>
where
    S: BrowserSession + ?Sized,
{
    let links = session.find_all(&PAGINATION_LINKS).await?;
    let mut max = None;
    for link in &links {
        match session.read_text(link).await {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(page) = text.parse::<u32>() {
                        max = max.max(Some(page));
                    }
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Skipping unreadable pager link: {}", e),
        }
    }
    Ok(max.filter(|&page| page > 0))
}

async fn reported_page_count<S>(session: &mut S) -> BrowserResult<Option<u32>>
where
    S: BrowserSession + ?Sized,
{
    let nodes = session.find_all(&TOTAL_COUNT).await?;
    for node in &nodes {
        match session.read_text(node).await {
            Ok(text) => {
                if let Some(pages) = pages_for_count_text(&text) {
                    return Ok(Some(pages));
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Skipping unreadable count text: {}", e),
        }
    }
    Ok(None)
}

fn probe_result(result: BrowserResult<Option<u32>>, what: &str) -> BrowserResult<Option<u32>> {
    match result {
        Err(e) if !e.is_fatal() => {
            debug!("{} probe failed: {}", what, e);
            Ok(None)
        }
        other => other,
    }
}

/// Total page count of the listing.
///
/// The highest numbered pager link wins; the "total N" text is the fallback,
/// then 1. When the count text implies more pages than the pager shows, both
/// numbers are logged and the pager value is kept.
pub async fn discover_total_pages<S>(session: &mut S) -> BrowserResult<u32>
where
    S: BrowserSession + ?Sized,
{
    let from_pager = probe_result(max_page_label(session).await, "Pager")?;
    let from_count = probe_result(reported_page_count(session).await, "Total count")?;

    let total = match (from_pager, from_count) {
        (Some(pager), Some(count)) => {
            if count > pager {
                warn!(
                    "Pager shows {} pages but the reported total implies {}; using {}",
                    pager, count, pager
                );
            }
            pager
        }
        (Some(pager), None) => pager,
        (None, Some(count)) => {
            debug!("No numbered pager links, using reported total ({} pages)", count);
            count
        }
        (None, None) => {
            warn!("Could not determine page count, assuming 1");
            1
        }
    };

    info!("Total pages: {}", total);
    Ok(total)
}

/// Perform `transition` and wait for the listing to change.
///
/// Fails when the control is missing, or when a non-empty listing still has
/// the same page label and titles once `timeout` elapses.
pub async fn navigate<S>(session: &mut S, transition: Transition, timeout: Duration) -> BrowserResult<()>
where
    S: BrowserSession + ?Sized,
{
    let before = listing_signature(session).await?;

    let chain: Cow<'_, [Locator]> = match transition {
        Transition::GotoPage(page) => Cow::Owned(vec![page_link(page)]),
        Transition::NextGroup { .. } => Cow::Borrowed(&NEXT_GROUP[..]),
    };
    let (_, control) = wait_for_any(session, &chain, timeout).await?;
    session.click(&control).await?;

    let Some(before) = before else {
        return Ok(());
    };

    let deadline = Instant::now() + timeout;
    let mut backoff = Backoff::default();
    loop {
        match listing_signature(session).await {
            Ok(Some(now)) if now != before => return Ok(()),
            Ok(None) => return Ok(()),
            Ok(Some(_)) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Listing not readable yet: {}", e),
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout {
                what: format!("listing for page {} to render", transition.target()),
                timeout,
            });
        }
        tokio::time::sleep(backoff.next_delay(deadline)).await;
    }
}
