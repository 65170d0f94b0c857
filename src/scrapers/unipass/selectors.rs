//! Locators for the UNIPASS customs classification section.
//!
//! Listing and detail views share one document: the case table sits under
//! the "품목분류사례" heading and the selected case renders under
//! "상세보기" further down.

use crate::browser::Locator;

pub const MAIN_PATH: &str = "/clip/index.do";
pub const DIRECT_FRAGMENT: &str = "#702010100000";

// Search flow
pub static WORLD_HS_MENU: Locator = Locator::xpath("//span[contains(text(), '세계HS')]");
pub static DOMESTIC_CASE_MENU: Locator = Locator::css("#LEFTMENU_LNK_M_ULS0807030051");
pub static CALENDAR_BUTTON: Locator = Locator::xpath("(//a[@class='btn_calendar'])[1]");
pub static YEAR_SELECT: Locator =
    Locator::xpath("//select[@name='selectYear' and @title='시작일자 연도']");
pub static MONTH_SELECT: Locator =
    Locator::xpath("//select[@name='selectMonth' and @title='시작일자 월']");
pub static FIRST_DAY: Locator = Locator::xpath(
    "//div[contains(@class, 'day') and contains(@class, 'toMonth') and text()='1']",
);
pub static DATE_CONFIRM: Locator = Locator::xpath("//button[@name='dateSelectBtn']");
pub static SEARCH_BUTTONS: [Locator; 2] = [
    Locator::xpath("//button[@type='submit' and @title='조회']"),
    Locator::xpath("//button//span[text()='조회']/parent::button"),
];

// Listing
pub static LISTING_HEADING: Locator = Locator::xpath("//h2[contains(text(), '품목분류사례')]");
pub static PAGINATION_LINKS: Locator = Locator::xpath(
    "//div[contains(@class, 'paging')]//a | //div[contains(@class, 'pagination')]//a",
);
pub static TOTAL_COUNT: Locator = Locator::xpath("//*[contains(text(), '건') or contains(text(), '총')]");
pub static CASE_ROWS: Locator =
    Locator::xpath("//h2[contains(text(), '품목분류사례')]/following::table[1]//tbody//tr");
pub static CASE_LINKS: Locator =
    Locator::xpath("//h2[contains(text(), '품목분류사례')]/following::table[1]//tbody//tr//a");
pub static NEXT_GROUP: [Locator; 2] = [
    Locator::xpath(
        "//h2[contains(text(), '품목분류사례')]/following::span[contains(text(), '다음10페이지')][1]/parent::a",
    ),
    Locator::xpath(
        "//h2[contains(text(), '품목분류사례')]/following::a[contains(@title, '다음10페이지')][1]",
    ),
];

/// Highlighted label of the page currently shown.
pub static ACTIVE_PAGE: Locator = Locator::xpath(
    "//h2[contains(text(), '품목분류사례')]/following::ul[@class='pages'][1]//strong | //h2[contains(text(), '품목분류사례')]/following::ul[@class='pages'][1]//li[contains(@class, 'on')]",
);

/// Numbered link for `page` in the pager under the case table.
pub fn page_link(page: u32) -> Locator {
    Locator::xpath_owned(format!(
        "//h2[contains(text(), '품목분류사례')]/following::ul[@class='pages'][1]//a[normalize-space(text())='{}']",
        page
    ))
}

// Detail view
pub static DETAIL_HEADING: Locator = Locator::xpath("//h2[contains(text(), '상세보기')]");
pub static DETAIL_TABLE: Locator =
    Locator::xpath("//h2[contains(text(), '상세보기')]/following::table[1]");
pub const ROW: &str = "tr";
pub const HEADER_CELL: &str = "th";
pub const DATA_CELL: &str = "td";
pub const IMAGE: &str = "img";

/// Print affordances, highest priority first: title attribute, inline
/// handler, visible label, icon alt text.
pub static PRINT_BUTTONS: [Locator; 4] = [
    Locator::xpath("//button[@title='인쇄'] | //a[@title='인쇄']"),
    Locator::xpath("//button[contains(@onclick, 'print')] | //a[contains(@onclick, 'print')]"),
    Locator::xpath(
        "//button[contains(text(), '인쇄')] | //span[contains(text(), '인쇄')]/parent::button | //span[contains(text(), '인쇄')]/parent::a",
    ),
    Locator::xpath("//img[contains(@alt, '인쇄')]/parent::a | //img[contains(@alt, '인쇄')]/parent::button"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_link_addresses_label() {
        let Locator::XPath(expr) = page_link(7) else {
            panic!("page links are xpath");
        };
        assert!(expr.ends_with("//a[normalize-space(text())='7']"));
    }
}
