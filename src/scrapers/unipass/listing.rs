//! Case enumeration on the current listing page.

use tracing::debug;

use super::selectors::{ACTIVE_PAGE, CASE_LINKS, CASE_ROWS, DATA_CELL};
use crate::browser::{BrowserError, BrowserResult, BrowserSession};

/// Number of case rows in the listing table.
///
/// Header and separator rows carry no `<td>` and are not counted. A missing
/// table yields 0, which is a valid trailing-page state.
pub async fn count_on_current_page<S>(session: &mut S) -> BrowserResult<usize>
where
    S: BrowserSession + ?Sized,
{
    let rows = match session.find_all(&CASE_ROWS).await {
        Ok(rows) => rows,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!("Listing table not readable: {}", e);
            return Ok(0);
        }
    };

    let mut count = 0;
    for row in &rows {
        match session.find_within(row, DATA_CELL).await {
            Ok(cells) if !cells.is_empty() => count += 1,
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Skipping unreadable listing row: {}", e),
        }
    }
    Ok(count)
}

/// Click the case link at 0-based `position` on the current listing.
pub async fn open_case<S>(session: &mut S, position: usize) -> BrowserResult<()>
where
    S: BrowserSession + ?Sized,
{
    let links = session.find_all(&CASE_LINKS).await?;
    let link = links
        .get(position)
        .ok_or_else(|| BrowserError::NotFound(format!("case link #{}", position)))?;
    session.click(link).await
}

/// What identifies one rendered listing page: the highlighted pager label
/// and the text of every case link. Titles repeat across pages, so neither
/// the first title alone nor the label alone is enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSignature {
    pub active_page: Option<String>,
    pub titles: Vec<String>,
}

/// Signature of the current listing, `None` when it shows no cases.
pub async fn listing_signature<S>(session: &mut S) -> BrowserResult<Option<ListingSignature>>
where
    S: BrowserSession + ?Sized,
{
    let links = session.find_all(&CASE_LINKS).await?;
    if links.is_empty() {
        return Ok(None);
    }

    let mut titles = Vec::with_capacity(links.len());
    for link in &links {
        titles.push(session.read_text(link).await?.trim().to_string());
    }

    let active_page = match session.find_one(&ACTIVE_PAGE).await {
        Ok(Some(label)) => Some(session.read_text(&label).await?.trim().to_string()),
        Ok(None) => None,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!("Active pager label not readable: {}", e);
            None
        }
    };

    Ok(Some(ListingSignature { active_page, titles }))
}
