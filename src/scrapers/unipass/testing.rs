//! Scripted in-memory UNIPASS site for exercising the scraper without a
//! browser.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use super::selectors::*;
use crate::browser::{
    BrowserError, BrowserResult, BrowserSession, Locator, PdfOptions, WindowHandle,
};

pub const MAIN_WINDOW: &str = "main";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4 mock";

/// Short wait bound so failing lookups resolve quickly in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(30);
pub const TEST_POPUP_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkBehavior {
    Opens,
    Broken,
    SessionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMode {
    Popup,
    SameWindow,
    Missing,
}

#[derive(Debug, Clone)]
pub struct MockCase {
    /// Header/value cells of the detail table. `None` leaves the cell out.
    pub rows: Vec<(Option<String>, Option<String>)>,
    pub images: Vec<String>,
    pub link: LinkBehavior,
    pub has_detail: bool,
}

impl MockCase {
    /// A case with all four labelled rows.
    pub fn full(title: &str) -> Self {
        Self::with_rows(&[
            ("품명", title),
            ("HS부호", "8518.30-2000"),
            ("물품해설", "블루투스 이어폰"),
            ("결정사유", "관세율표 해석에 관한 통칙 제1호 및 제6호"),
        ])
    }

    pub fn with_rows(rows: &[(&str, &str)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(h, v)| (Some(h.to_string()), Some(v.to_string())))
                .collect(),
            images: Vec::new(),
            link: LinkBehavior::Opens,
            has_detail: true,
        }
    }

    pub fn title(&self) -> String {
        self.rows
            .iter()
            .find_map(|(h, v)| match (h.as_deref(), v) {
                (Some("품명"), Some(v)) => Some(v.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockElement {
    WorldHsMenu,
    DomesticMenu,
    Calendar,
    YearSelect,
    MonthSelect,
    FirstDay,
    DateConfirm,
    SearchButton,
    ListingHeading,
    PagerLabel(String),
    CountText(String),
    PageLink(u32),
    NextGroup,
    CaseRow { position: Option<usize> },
    Cell(String),
    CaseLink(usize),
    DetailHeading,
    DetailTable,
    DetailRow(usize),
    HeaderCell(String),
    DataCell(String),
    Image(String),
    PrintButton,
}

/// Simulated site: listing pages in groups of ten, a detail view under the
/// listing, and a print button that may open a pop-up window.
#[derive(Debug)]
pub struct MockSite {
    pub pages: Vec<Vec<MockCase>>,
    pub separator_rows: bool,
    /// Highest page label shown in the pager. Defaults to the real count.
    pub advertised_last_page: Option<u32>,
    pub total_text: Option<String>,
    /// Leaves the numbered pager links out, as on a single-page result.
    pub pager_hidden: bool,
    /// Marks the current page in the pager with a highlighted label.
    pub highlight_current_page: bool,
    pub broken_page_links: HashSet<u32>,
    pub print_mode: PrintMode,
    /// Which print locator strategy matches, 0-based.
    pub print_rank: usize,
    pub pdf_fails: bool,
    pub menu_missing: bool,
    /// Each entry fails the next switch to that window once.
    pub failing_switches: Vec<WindowHandle>,
    pub close_fails: bool,
    /// Switching back to the main window reports the browser as gone.
    pub lost_on_switch: bool,

    pub current_page: u32,
    pub windows: Vec<WindowHandle>,
    pub active: WindowHandle,
    pub detail_open: Option<(u32, usize)>,
    pub world_menu_clicked: bool,
    pub section_open: bool,
    pub searched: bool,

    pub opened: Vec<String>,
    pub selections: Vec<(MockElement, String)>,
    pub page_link_clicks: Vec<u32>,
    pub next_group_clicks: Vec<u32>,
    pub pdf_calls: Vec<WindowHandle>,
    pub downloads: Vec<String>,
    popups_opened: usize,
}

impl MockSite {
    pub fn new(pages: Vec<Vec<MockCase>>) -> Self {
        let main = WindowHandle(MAIN_WINDOW.to_string());
        Self {
            pages,
            separator_rows: true,
            advertised_last_page: None,
            total_text: None,
            pager_hidden: false,
            highlight_current_page: true,
            broken_page_links: HashSet::new(),
            print_mode: PrintMode::Popup,
            print_rank: 0,
            pdf_fails: false,
            menu_missing: false,
            failing_switches: Vec::new(),
            close_fails: false,
            lost_on_switch: false,
            current_page: 1,
            windows: vec![main.clone()],
            active: main,
            detail_open: None,
            world_menu_clicked: false,
            section_open: false,
            searched: false,
            opened: Vec::new(),
            selections: Vec::new(),
            page_link_clicks: Vec::new(),
            next_group_clicks: Vec::new(),
            pdf_calls: Vec::new(),
            downloads: Vec::new(),
            popups_opened: 0,
        }
    }

    /// Pages of `sizes[i]` full cases with unique titles.
    pub fn with_page_sizes(sizes: &[usize]) -> Self {
        let pages = sizes
            .iter()
            .enumerate()
            .map(|(p, &n)| {
                (0..n)
                    .map(|i| MockCase::full(&format!("사례 {}-{}", p + 1, i + 1)))
                    .collect()
            })
            .collect();
        Self::new(pages)
    }

    /// Site already showing a case's detail view, for capture tests.
    pub fn showing_detail() -> Self {
        let mut site = Self::with_page_sizes(&[1]);
        site.section_open = true;
        site.searched = true;
        site.detail_open = Some((1, 0));
        site
    }

    pub fn main_window() -> WindowHandle {
        WindowHandle(MAIN_WINDOW.to_string())
    }

    pub fn case_mut(&mut self, page: u32, position: usize) -> &mut MockCase {
        &mut self.pages[page as usize - 1][position]
    }

    fn data_pages(&self) -> u32 {
        self.pages.len() as u32
    }

    fn current_cases(&self) -> &[MockCase] {
        self.pages
            .get(self.current_page as usize - 1)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn group_range(&self) -> (u32, u32) {
        let first = (self.current_page - 1) / 10 * 10 + 1;
        (first, (first + 9).min(self.data_pages()))
    }

    fn open_detail(&self) -> Option<&MockCase> {
        let (page, position) = self.detail_open?;
        self.pages.get(page as usize - 1)?.get(position)
    }

    fn on_main(&self) -> bool {
        self.active.0 == MAIN_WINDOW
    }

    fn query(&self, locator: &Locator) -> Vec<MockElement> {
        use MockElement as E;

        if !self.on_main() {
            return Vec::new();
        }
        let only = |cond: bool, el: E| if cond { vec![el] } else { Vec::new() };

        if *locator == WORLD_HS_MENU {
            return only(!self.menu_missing, E::WorldHsMenu);
        }
        if *locator == DOMESTIC_CASE_MENU {
            return only(!self.menu_missing && self.world_menu_clicked, E::DomesticMenu);
        }
        if *locator == CALENDAR_BUTTON {
            return only(self.section_open, E::Calendar);
        }
        if *locator == YEAR_SELECT {
            return only(self.section_open, E::YearSelect);
        }
        if *locator == MONTH_SELECT {
            return only(self.section_open, E::MonthSelect);
        }
        if *locator == FIRST_DAY {
            return only(self.section_open, E::FirstDay);
        }
        if *locator == DATE_CONFIRM {
            return only(self.section_open, E::DateConfirm);
        }
        if *locator == SEARCH_BUTTONS[0] {
            return only(self.section_open, E::SearchButton);
        }
        if *locator == LISTING_HEADING {
            return only(self.searched, E::ListingHeading);
        }
        if !self.searched {
            return Vec::new();
        }

        if *locator == PAGINATION_LINKS {
            if self.pager_hidden {
                return Vec::new();
            }
            let (first, last) = self.group_range();
            let mut labels: Vec<E> = (first..=last).map(|p| E::PagerLabel(p.to_string())).collect();
            labels.push(E::PagerLabel("다음10페이지".to_string()));
            let final_page = self.advertised_last_page.unwrap_or(self.data_pages());
            labels.push(E::PagerLabel(final_page.to_string()));
            return labels;
        }
        if *locator == ACTIVE_PAGE {
            return only(
                self.highlight_current_page && !self.pager_hidden,
                E::PagerLabel(self.current_page.to_string()),
            );
        }
        if *locator == TOTAL_COUNT {
            return self
                .total_text
                .iter()
                .map(|t| E::CountText(t.clone()))
                .collect();
        }
        if *locator == CASE_ROWS {
            let mut rows = Vec::new();
            if self.separator_rows && !self.current_cases().is_empty() {
                rows.push(E::CaseRow { position: None });
            }
            rows.extend((0..self.current_cases().len()).map(|i| E::CaseRow { position: Some(i) }));
            return rows;
        }
        if *locator == CASE_LINKS {
            return (0..self.current_cases().len()).map(E::CaseLink).collect();
        }
        if *locator == NEXT_GROUP[0] {
            let (first, _) = self.group_range();
            return only(first + 10 <= self.data_pages(), E::NextGroup);
        }
        if *locator == DETAIL_HEADING {
            return only(self.open_detail().is_some(), E::DetailHeading);
        }
        if *locator == DETAIL_TABLE {
            return only(self.open_detail().is_some(), E::DetailTable);
        }
        if let Some(rank) = PRINT_BUTTONS.iter().position(|l| l == locator) {
            let visible = self.open_detail().is_some()
                && self.print_mode != PrintMode::Missing
                && rank == self.print_rank;
            return only(visible, E::PrintButton);
        }

        let (first, last) = self.group_range();
        for page in first..=last {
            if page_link(page) == *locator {
                return only(!self.broken_page_links.contains(&page), E::PageLink(page));
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl BrowserSession for MockSite {
    type Element = MockElement;

    async fn open(&mut self, url: &str) -> BrowserResult<()> {
        self.opened.push(url.to_string());
        if url.ends_with(DIRECT_FRAGMENT) {
            self.section_open = true;
        }
        Ok(())
    }

    async fn find_all(&mut self, locator: &Locator) -> BrowserResult<Vec<MockElement>> {
        Ok(self.query(locator))
    }

    async fn find_within(&mut self, parent: &MockElement, css: &str) -> BrowserResult<Vec<MockElement>> {
        use MockElement as E;

        let found = match (parent, css) {
            (E::CaseRow { position: Some(i) }, DATA_CELL) => self
                .current_cases()
                .get(*i)
                .map(|c| vec![E::Cell(c.title())])
                .unwrap_or_default(),
            (E::DetailTable, ROW) => self
                .open_detail()
                .map(|c| (0..c.rows.len()).map(E::DetailRow).collect())
                .unwrap_or_default(),
            (E::DetailTable, IMAGE) => self
                .open_detail()
                .map(|c| c.images.iter().cloned().map(E::Image).collect())
                .unwrap_or_default(),
            (E::DetailRow(i), HEADER_CELL) => self
                .open_detail()
                .and_then(|c| c.rows.get(*i))
                .and_then(|(h, _)| h.clone())
                .map(|h| vec![E::HeaderCell(h)])
                .unwrap_or_default(),
            (E::DetailRow(i), DATA_CELL) => self
                .open_detail()
                .and_then(|c| c.rows.get(*i))
                .and_then(|(_, v)| v.clone())
                .map(|v| vec![E::DataCell(v)])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn click(&mut self, element: &MockElement) -> BrowserResult<()> {
        use MockElement as E;

        match element {
            E::WorldHsMenu => self.world_menu_clicked = true,
            E::DomesticMenu => self.section_open = true,
            E::SearchButton => self.searched = true,
            E::PageLink(page) => {
                self.page_link_clicks.push(*page);
                self.current_page = *page;
                self.detail_open = None;
            }
            E::NextGroup => {
                let (first, _) = self.group_range();
                self.current_page = first + 10;
                self.next_group_clicks.push(self.current_page);
                self.detail_open = None;
            }
            E::CaseLink(position) => {
                let (link, has_detail) = self
                    .current_cases()
                    .get(*position)
                    .map(|c| (c.link, c.has_detail))
                    .ok_or_else(|| BrowserError::NotFound(format!("case {}", position)))?;
                match link {
                    LinkBehavior::Opens => {
                        self.detail_open = has_detail.then_some((self.current_page, *position));
                    }
                    LinkBehavior::Broken => {
                        return Err(BrowserError::NotFound("stale case link".to_string()))
                    }
                    LinkBehavior::SessionLost => {
                        return Err(BrowserError::SessionLost("browser closed".to_string()))
                    }
                }
            }
            E::PrintButton => {
                if self.print_mode == PrintMode::Popup {
                    self.popups_opened += 1;
                    self.windows
                        .push(WindowHandle(format!("print-{}", self.popups_opened)));
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn read_text(&mut self, element: &MockElement) -> BrowserResult<String> {
        use MockElement as E;

        let text = match element {
            E::PagerLabel(s) | E::CountText(s) | E::Cell(s) | E::HeaderCell(s) | E::DataCell(s) => {
                s.clone()
            }
            E::CaseLink(position) => self
                .current_cases()
                .get(*position)
                .map(MockCase::title)
                .unwrap_or_default(),
            E::DetailTable => match (self.detail_open, self.open_detail()) {
                (Some((page, position)), Some(case)) => {
                    let cells: Vec<String> = case
                        .rows
                        .iter()
                        .map(|(h, v)| format!("{} {}", h.as_deref().unwrap_or(""), v.as_deref().unwrap_or("")))
                        .collect();
                    format!("{}-{} {}", page, position, cells.join(" "))
                }
                _ => String::new(),
            },
            _ => String::new(),
        };
        Ok(text)
    }

    async fn read_attribute(&mut self, element: &MockElement, name: &str) -> BrowserResult<Option<String>> {
        match (element, name) {
            (MockElement::Image(src), "src") => Ok(Some(src.clone())),
            _ => Ok(None),
        }
    }

    async fn select_option(&mut self, element: &MockElement, value: &str) -> BrowserResult<()> {
        self.selections.push((element.clone(), value.to_string()));
        Ok(())
    }

    async fn window_handles(&mut self) -> BrowserResult<Vec<WindowHandle>> {
        Ok(self.windows.clone())
    }

    async fn current_window(&mut self) -> BrowserResult<WindowHandle> {
        Ok(self.active.clone())
    }

    async fn switch_to_window(&mut self, handle: &WindowHandle) -> BrowserResult<()> {
        if self.lost_on_switch && handle.0 == MAIN_WINDOW {
            return Err(BrowserError::SessionLost("browser closed".to_string()));
        }
        if let Some(at) = self.failing_switches.iter().position(|w| w == handle) {
            self.failing_switches.remove(at);
            return Err(BrowserError::UnknownWindow(handle.to_string()));
        }
        if !self.windows.contains(handle) {
            return Err(BrowserError::UnknownWindow(handle.to_string()));
        }
        self.active = handle.clone();
        Ok(())
    }

    async fn close_current_window(&mut self) -> BrowserResult<()> {
        if self.close_fails {
            return Err(BrowserError::Protocol("Target.closeTarget failed".to_string()));
        }
        let closing = self.active.clone();
        self.windows.retain(|w| *w != closing);
        if let Some(first) = self.windows.first() {
            self.active = first.clone();
        }
        Ok(())
    }

    async fn print_to_pdf(&mut self, _options: &PdfOptions) -> BrowserResult<Vec<u8>> {
        self.pdf_calls.push(self.active.clone());
        if self.pdf_fails {
            return Err(BrowserError::Capture("printToPDF failed".to_string()));
        }
        Ok(PDF_BYTES.to_vec())
    }

    async fn download_resource(&mut self, source: &str) -> BrowserResult<Vec<u8>> {
        self.downloads.push(source.to_string());
        if source.contains("broken") {
            return Err(BrowserError::Download(format!("{}: HTTP 404", source)));
        }
        Ok(source.as_bytes().to_vec())
    }
}
