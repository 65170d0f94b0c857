//! Scraper for the UNIPASS domestic HS classification cases.
//!
//! [`ScrapeController`] owns the run: it submits the search, walks the grouped
//! pager with a [`PageCursor`], opens every case, extracts its fields and
//! captures it as a PDF, then appends the record to the [`ResultStore`].
//!
//! [`ResultStore`]: crate::storage::ResultStore

mod artifact;
mod controller;
mod cursor;
mod detail;
mod listing;
mod search;
pub mod selectors;
#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{artifact_path, ArtifactCapturer, CaptureError};
pub use controller::{
    RunReport, RunState, ScrapeController, ScrapeError, ScrapeOptions, DEFAULT_BASE_URL,
};
pub use cursor::{discover_total_pages, PageCursor, Transition, GROUP_SIZE};
pub use detail::{classify_header, CaseDetail, DetailExtractor, DetailField};
pub use listing::count_on_current_page;
pub use search::SearchForm;
