//! Run orchestration: search, page walk, per-case extraction and
//! checkpointing.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::artifact::{ArtifactCapturer, CaptureError};
use super::cursor::{discover_total_pages, navigate, PageCursor, Transition};
use super::detail::{CaseDetail, DetailExtractor};
use super::listing::{count_on_current_page, open_case};
use super::search::SearchForm;
use crate::browser::resource::{describe_source, image_extension, resolve_url};
use crate::browser::{BrowserError, BrowserSession};
use crate::models::{CaseImage, CaseRecord};
use crate::storage::{FlushOutcome, ResultStore, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://unipass.customs.go.kr";

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Failed to store record: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Init,
    Searching,
    Listing,
    Detailing,
    Checkpointing,
    Done,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub base_url: String,
    pub start_year: i32,
    pub start_month: u32,
    /// Upper bound on pages walked, for bounded runs.
    pub max_pages: Option<u32>,
    /// Uniform bound for explicit waits.
    pub wait_timeout: Duration,
    /// How long to look for a print pop-up before capturing in place.
    pub popup_timeout: Duration,
    pub download_images: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            start_year: 2016,
            start_month: 1,
            max_pages: None,
            wait_timeout: Duration::from_secs(20),
            popup_timeout: Duration::from_secs(3),
            download_images: true,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub state: RunState,
    pub total_pages: u32,
    pub last_page: u32,
    pub records: usize,
    pub skipped_cases: usize,
    pub skipped_pages: Vec<u32>,
    pub group_transitions: usize,
    pub checkpoints: usize,
    pub abort_reason: Option<String>,
    pub flush_error: Option<String>,
}

/// Walks the listing and fills the result store.
pub struct ScrapeController {
    options: ScrapeOptions,
    store: ResultStore,
    state: RunState,
    report: RunReport,
}

impl ScrapeController {
    pub fn new(options: ScrapeOptions, store: ResultStore) -> Self {
        Self {
            options,
            store,
            state: RunState::Init,
            report: RunReport::default(),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run the scrape to completion.
    ///
    /// Per-case and per-page failures are logged and skipped. Session loss
    /// ends the run as [`RunState::Aborted`]. Accumulated records are flushed
    /// however the run ends.
    pub async fn run<S>(&mut self, session: &mut S) -> RunReport
    where
        S: BrowserSession + ?Sized,
    {
        match self.drive(session).await {
            Ok(()) => self.set_state(RunState::Done),
            Err(e) => {
                error!("Scrape aborted: {}", e);
                self.report.abort_reason = Some(e.to_string());
                self.set_state(RunState::Aborted);
            }
        }

        match self.store.flush() {
            Ok(FlushOutcome::Written { records }) => info!("Saved {} records", records),
            Ok(FlushOutcome::Empty) => {}
            Err(e) => {
                error!("Final save failed: {}", e);
                self.report.flush_error = Some(e.to_string());
            }
        }

        self.report.state = self.state;
        self.report.records = self.store.len();
        self.report.clone()
    }

    fn set_state(&mut self, next: RunState) {
        if self.state != next {
            debug!("State {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    async fn drive<S>(&mut self, session: &mut S) -> Result<(), ScrapeError>
    where
        S: BrowserSession + ?Sized,
    {
        self.set_state(RunState::Searching);
        let form = SearchForm {
            base_url: self.options.base_url.clone(),
            start_year: self.options.start_year,
            start_month: self.options.start_month,
            timeout: self.options.wait_timeout,
        };
        if !form.submit(session).await? {
            warn!("Listing did not render after search");
        }

        self.set_state(RunState::Listing);
        let discovered = discover_total_pages(session).await?;
        let total = match self.options.max_pages {
            Some(cap) if cap < discovered => {
                info!("Limiting run to {} of {} pages", cap, discovered);
                cap
            }
            _ => discovered,
        };
        let mut cursor = PageCursor::new(total);
        self.report.total_pages = cursor.total_pages();

        let timeout = self.options.wait_timeout;
        let mut extractor = DetailExtractor::new(timeout);
        let capturer = ArtifactCapturer::new(
            self.store.layout().pdf_dir(),
            timeout,
            self.options.popup_timeout,
        );

        let mut page_loaded = true;
        while !cursor.is_done() {
            let page = cursor.current_page();
            self.report.last_page = page;
            self.set_state(RunState::Listing);

            if page_loaded {
                info!("Processing page {}/{}", page, cursor.total_pages());
                self.scrape_page(session, page, &mut extractor, &capturer)
                    .await?;
            }

            let Some(transition) = cursor.advance() else {
                break;
            };

            page_loaded = match navigate(session, transition, timeout).await {
                Ok(()) => {
                    if let Transition::NextGroup { first_page } = transition {
                        info!("Moved to page group starting at {}", first_page);
                        self.report.group_transitions += 1;
                    }
                    true
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => match transition {
                    Transition::NextGroup { first_page } => {
                        info!(
                            "No page group after page {} ({}), finishing",
                            first_page - 1,
                            e
                        );
                        return Ok(());
                    }
                    Transition::GotoPage(target) => {
                        warn!("Could not open page {}, skipping: {}", target, e);
                        self.report.skipped_pages.push(target);
                        false
                    }
                },
            };

            if cursor.at_group_start() {
                self.checkpoint();
            }
        }

        Ok(())
    }

    async fn scrape_page<S>(
        &mut self,
        session: &mut S,
        page: u32,
        extractor: &mut DetailExtractor,
        capturer: &ArtifactCapturer,
    ) -> Result<(), ScrapeError>
    where
        S: BrowserSession + ?Sized,
    {
        let count = count_on_current_page(session).await?;
        info!("Cases on page {}: {}", page, count);

        for position in 0..count {
            self.scrape_case(session, page, position, extractor, capturer)
                .await?;
        }
        Ok(())
    }

    async fn scrape_case<S>(
        &mut self,
        session: &mut S,
        page: u32,
        position: usize,
        extractor: &mut DetailExtractor,
        capturer: &ArtifactCapturer,
    ) -> Result<(), ScrapeError>
    where
        S: BrowserSession + ?Sized,
    {
        self.set_state(RunState::Detailing);

        if let Err(e) = open_case(session, position).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!("Page {} case {}: click failed, skipping: {}", page, position + 1, e);
            self.report.skipped_cases += 1;
            return Ok(());
        }

        let detail = match extractor.extract(session).await {
            Ok(detail) => detail,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Page {} case {}: no detail view, skipping: {}", page, position + 1, e);
                self.report.skipped_cases += 1;
                return Ok(());
            }
        };
        let extracted_at = Utc::now();
        let index = self.store.next_index();

        let artifact_path = match capturer.capture(session, index).await {
            Ok(path) => Some(path),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                warn!("Case {}: PDF capture failed: {}", index, e);
                None
            }
        };

        let images = if self.options.download_images {
            self.save_images(session, index, &detail).await?
        } else {
            Vec::new()
        };

        info!(
            "Case {}: {} [{}]",
            index,
            detail.title.as_deref().unwrap_or("-"),
            detail.code.as_deref().unwrap_or("-")
        );
        self.store.append(CaseRecord {
            index,
            title: detail.title,
            code: detail.code,
            description: detail.description,
            images,
            classification_reason: detail.classification_reason,
            artifact_path,
            extracted_at,
        })?;
        Ok(())
    }

    async fn save_images<S>(
        &mut self,
        session: &mut S,
        index: u64,
        detail: &CaseDetail,
    ) -> Result<Vec<CaseImage>, ScrapeError>
    where
        S: BrowserSession + ?Sized,
    {
        let images_dir = self.store.layout().images_dir();
        let mut saved = Vec::new();

        for (n, src) in detail.image_sources.iter().enumerate() {
            let source = resolve_url(&self.options.base_url, src);
            let bytes = match session.download_resource(&source).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Case {}: image download failed: {}", index, e);
                    continue;
                }
            };

            let local_path: PathBuf = images_dir.join(format!(
                "case_{}_{}.{}",
                index,
                n + 1,
                image_extension(&source)
            ));
            if let Err(e) = tokio::fs::write(&local_path, &bytes).await {
                warn!("Case {}: could not write {}: {}", index, local_path.display(), e);
                continue;
            }
            saved.push(CaseImage {
                source: describe_source(&source),
                local_path,
            });
        }
        Ok(saved)
    }

    fn checkpoint(&mut self) {
        self.set_state(RunState::Checkpointing);
        match self.store.flush() {
            Ok(FlushOutcome::Written { records }) => {
                info!("Checkpoint saved ({} records)", records)
            }
            Ok(FlushOutcome::Empty) => debug!("Checkpoint skipped, nothing collected yet"),
            Err(e) => warn!("Checkpoint save failed: {}", e),
        }
        self.report.checkpoints += 1;
        self.set_state(RunState::Listing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::unipass::testing::{
        LinkBehavior, MockCase, MockSite, PrintMode, TEST_POPUP_TIMEOUT, TEST_TIMEOUT,
    };
    use crate::storage::OutputLayout;
    use tempfile::TempDir;

    fn controller(max_pages: Option<u32>) -> (TempDir, ScrapeController) {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.prepare().unwrap();
        let options = ScrapeOptions {
            max_pages,
            wait_timeout: TEST_TIMEOUT,
            popup_timeout: TEST_POPUP_TIMEOUT,
            ..ScrapeOptions::default()
        };
        (dir, ScrapeController::new(options, ResultStore::new(layout)))
    }

    fn indices(controller: &ScrapeController) -> Vec<u64> {
        controller.store().records().iter().map(|r| r.index).collect()
    }

    #[tokio::test]
    async fn eleven_pages_cross_one_group_boundary() {
        let mut sizes = vec![2; 10];
        sizes.push(3);
        let mut site = MockSite::with_page_sizes(&sizes);
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.total_pages, 11);
        assert_eq!(report.records, 23);
        assert_eq!(indices(&controller), (1..=23).collect::<Vec<u64>>());
        assert_eq!(report.group_transitions, 1);
        assert_eq!(site.next_group_clicks, vec![11]);
        assert_eq!(site.page_link_clicks, (2..=10).collect::<Vec<u32>>());
        assert_eq!(report.checkpoints, 1);
        assert!(controller.store().layout().json_path().exists());
    }

    #[tokio::test]
    async fn three_full_pages_stay_in_first_group() {
        let mut site = MockSite::with_page_sizes(&[10, 10, 3]);
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.total_pages, 3);
        assert_eq!(indices(&controller), (1..=23).collect::<Vec<u64>>());
        assert_eq!(report.group_transitions, 0);
        assert_eq!(report.checkpoints, 0);
        assert!(site.next_group_clicks.is_empty());
    }

    #[tokio::test]
    async fn missing_next_group_ends_run_as_done() {
        let mut site = MockSite::with_page_sizes(&[1; 20]);
        site.advertised_last_page = Some(30);
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.total_pages, 30);
        assert_eq!(report.records, 20);
        assert_eq!(report.last_page, 20);
        assert_eq!(report.group_transitions, 1);
        assert!(report.abort_reason.is_none());
    }

    #[tokio::test]
    async fn failed_cases_do_not_break_index_sequence() {
        let mut site = MockSite::with_page_sizes(&[4]);
        site.case_mut(1, 1).link = LinkBehavior::Broken;
        site.case_mut(1, 2).has_detail = false;
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.skipped_cases, 2);
        assert_eq!(indices(&controller), vec![1, 2]);
        let titles: Vec<_> = controller
            .store()
            .records()
            .iter()
            .map(|r| r.title.clone().unwrap())
            .collect();
        assert_eq!(titles, vec!["사례 1-1", "사례 1-4"]);
    }

    #[tokio::test]
    async fn session_loss_aborts_after_flushing() {
        let mut site = MockSite::with_page_sizes(&[3, 3]);
        site.case_mut(1, 2).link = LinkBehavior::SessionLost;
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Aborted);
        assert!(report.abort_reason.is_some());
        assert_eq!(report.records, 2);
        let json = std::fs::read_to_string(controller.store().layout().json_path()).unwrap();
        let saved: Vec<CaseRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test]
    async fn unreachable_page_is_skipped_without_duplicates() {
        let mut site = MockSite::with_page_sizes(&[2, 2, 2, 2]);
        site.broken_page_links.insert(3);
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.skipped_pages, vec![3]);
        assert_eq!(indices(&controller), vec![1, 2, 3, 4, 5, 6]);
        let titles: Vec<_> = controller
            .store()
            .records()
            .iter()
            .filter_map(|r| r.title.clone())
            .collect();
        assert!(!titles.iter().any(|t| t.starts_with("사례 3-")));
        assert_eq!(titles.last().map(String::as_str), Some("사례 4-2"));
    }

    #[tokio::test]
    async fn page_cap_limits_walk() {
        let mut site = MockSite::with_page_sizes(&[2, 2, 2, 2, 2]);
        let (_dir, mut controller) = controller(Some(2));

        let report = controller.run(&mut site).await;

        assert_eq!(report.total_pages, 2);
        assert_eq!(report.records, 4);
    }

    #[tokio::test]
    async fn capture_failure_keeps_record_without_pdf() {
        let mut site = MockSite::with_page_sizes(&[2]);
        site.print_mode = PrintMode::Missing;
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.records, 2);
        assert!(controller
            .store()
            .records()
            .iter()
            .all(|r| r.artifact_path.is_none()));
    }

    #[tokio::test]
    async fn images_are_saved_per_case() {
        let mut site = MockSite::with_page_sizes(&[1]);
        site.case_mut(1, 0).images = vec![
            "/img/case/photo.jpg".to_string(),
            "/img/broken.png".to_string(),
            "data:image/png;base64,aGVsbG8=".to_string(),
        ];
        let (_dir, mut controller) = controller(None);

        controller.run(&mut site).await;

        let record = &controller.store().records()[0];
        assert_eq!(record.images.len(), 2);
        assert_eq!(
            record.images[0].source,
            "https://unipass.customs.go.kr/img/case/photo.jpg"
        );
        assert!(record.images[0].local_path.ends_with("case_1_1.jpg"));
        assert_eq!(record.images[1].source, "data:image/png;base64");
        assert!(record.images[1].local_path.ends_with("case_1_3.png"));
        assert!(record.images[1].local_path.exists());
        assert!(record.artifact_path.as_ref().unwrap().ends_with("case_1.pdf"));
    }

    #[tokio::test]
    async fn search_falls_back_to_direct_url() {
        let mut site = MockSite::with_page_sizes(&[1]);
        site.menu_missing = true;
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.records, 1);
        assert!(site
            .opened
            .last()
            .unwrap()
            .ends_with("/clip/index.do#702010100000"));
    }

    #[tokio::test]
    async fn repeated_first_title_on_next_page_is_still_scraped() {
        let mut site = MockSite::with_page_sizes(&[2, 2]);
        site.pages[1][0] = MockCase::full("사례 1-1");
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert!(report.skipped_pages.is_empty());
        assert_eq!(report.records, 4);
        assert_eq!(report.last_page, 2);
    }

    #[tokio::test]
    async fn repeated_first_title_across_group_boundary_keeps_walking() {
        let mut site = MockSite::with_page_sizes(&[2; 12]);
        site.pages[10][0] = MockCase::full("사례 10-1");
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.group_transitions, 1);
        assert_eq!(report.records, 24);
        assert_eq!(report.last_page, 12);
    }

    #[tokio::test]
    async fn empty_trailing_page_finishes_run() {
        let mut site = MockSite::with_page_sizes(&[2, 0]);
        let (_dir, mut controller) = controller(None);

        let report = controller.run(&mut site).await;

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.total_pages, 2);
        assert_eq!(report.records, 2);
        assert!(report.skipped_pages.is_empty());
    }
}
