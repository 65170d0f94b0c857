//! Navigation to the domestic classification cases section and the date
//! filtered search.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::selectors::{
    CALENDAR_BUTTON, DATE_CONFIRM, DIRECT_FRAGMENT, DOMESTIC_CASE_MENU, FIRST_DAY, LISTING_HEADING,
    MAIN_PATH, MONTH_SELECT, SEARCH_BUTTONS, WORLD_HS_MENU, YEAR_SELECT,
};
use crate::browser::{wait_for, wait_for_any, BrowserError, BrowserResult, BrowserSession};

/// Drives the search form up to a rendered listing.
#[derive(Debug, Clone)]
pub struct SearchForm {
    pub base_url: String,
    pub start_year: i32,
    pub start_month: u32,
    pub timeout: Duration,
}

/// Log and swallow a transient error; fatal ones propagate.
fn soft<T>(result: BrowserResult<T>, step: &str) -> BrowserResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("{} failed: {}", step, e);
            Ok(None)
        }
    }
}

impl SearchForm {
    pub fn main_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), MAIN_PATH)
    }

    pub fn direct_url(&self) -> String {
        format!("{}{}", self.main_url(), DIRECT_FRAGMENT)
    }

    /// Open the site, apply the start date and submit.
    ///
    /// Returns whether the listing heading rendered. Only session loss is an
    /// error; every other failure is logged and the run continues with
    /// whatever the site shows.
    pub async fn submit<S>(&self, session: &mut S) -> BrowserResult<bool>
    where
        S: BrowserSession + ?Sized,
    {
        info!("Opening {}", self.main_url());
        session.open(&self.main_url()).await?;

        if soft(self.open_section(session).await, "Menu navigation")?.is_none() {
            info!("Opening section directly: {}", self.direct_url());
            soft(session.open(&self.direct_url()).await, "Direct navigation")?;
        }

        soft(self.set_start_date(session).await, "Setting start date")?;
        soft(self.click_search(session).await, "Submitting search")?;

        let rendered = soft(
            wait_for(session, &LISTING_HEADING, self.timeout).await,
            "Waiting for listing",
        )?
        .is_some();
        if rendered {
            info!("Listing rendered");
        }
        Ok(rendered)
    }

    async fn open_section<S>(&self, session: &mut S) -> BrowserResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        let menu = wait_for(session, &WORLD_HS_MENU, self.timeout).await?;
        session.click(&menu).await?;
        let link = wait_for(session, &DOMESTIC_CASE_MENU, self.timeout).await?;
        session.click(&link).await?;
        debug!("Opened domestic classification cases");
        Ok(())
    }

    async fn set_start_date<S>(&self, session: &mut S) -> BrowserResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        let calendar = wait_for(session, &CALENDAR_BUTTON, self.timeout).await?;
        session.click(&calendar).await?;

        let year = wait_for(session, &YEAR_SELECT, self.timeout).await?;
        session.select_option(&year, &self.start_year.to_string()).await?;

        match session.find_one(&MONTH_SELECT).await {
            Ok(Some(month)) => {
                for value in [self.start_month.to_string(), format!("{:02}", self.start_month)] {
                    match session.select_option(&month, &value).await {
                        Ok(()) => break,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => debug!("Month select rejected {}: {}", value, e),
                    }
                }
            }
            Ok(None) => debug!("No month select rendered"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Month select not readable: {}", e),
        }

        let day = wait_for(session, &FIRST_DAY, self.timeout).await?;
        session.click(&day).await?;
        let confirm = wait_for(session, &DATE_CONFIRM, self.timeout).await?;
        session.click(&confirm).await?;

        info!("Start date set to {}-{:02}-01", self.start_year, self.start_month);
        Ok(())
    }

    async fn click_search<S>(&self, session: &mut S) -> BrowserResult<()>
    where
        S: BrowserSession + ?Sized,
    {
        let (rank, button) = wait_for_any(session, &SEARCH_BUTTONS, self.timeout)
            .await
            .map_err(|e| match e {
                BrowserError::Timeout { timeout, .. } => BrowserError::Timeout {
                    what: "search button".to_string(),
                    timeout,
                },
                other => other,
            })?;
        debug!("Search button matched by strategy {}", rank + 1);
        session.click(&button).await
    }
}
