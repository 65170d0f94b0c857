//! Field extraction from the case detail view.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::selectors::{DATA_CELL, DETAIL_HEADING, DETAIL_TABLE, HEADER_CELL, IMAGE, ROW};
use crate::browser::{wait_for, Backoff, BrowserResult, BrowserSession};

/// Record field a detail row maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField {
    Title,
    Code,
    Description,
    ClassificationReason,
}

/// Header substrings per field, checked top to bottom.
const HEADER_RULES: &[(DetailField, &[&str])] = &[
    (DetailField::Title, &["품명"]),
    (DetailField::Code, &["HS", "세번"]),
    (DetailField::Description, &["해설", "내용"]),
    (DetailField::ClassificationReason, &["분류사유", "결정사유", "사유"]),
];

pub fn classify_header(header: &str) -> Option<DetailField> {
    HEADER_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| header.contains(n)))
        .map(|(field, _)| *field)
}

/// Values read from one detail view. Fields whose header was not found stay
/// `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseDetail {
    pub title: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub classification_reason: Option<String>,
    pub image_sources: Vec<String>,
}

impl CaseDetail {
    fn set(&mut self, field: DetailField, value: String) {
        let slot = match field {
            DetailField::Title => &mut self.title,
            DetailField::Code => &mut self.code,
            DetailField::Description => &mut self.description,
            DetailField::ClassificationReason => &mut self.classification_reason,
        };
        *slot = Some(value);
    }

    pub fn populated_fields(&self) -> usize {
        [
            &self.title,
            &self.code,
            &self.description,
            &self.classification_reason,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}

/// Reads the detail table of the case that was just opened.
#[derive(Debug)]
pub struct DetailExtractor {
    timeout: Duration,
    last_table_text: Option<String>,
}

impl DetailExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_table_text: None,
        }
    }

    /// Wait for the detail view and read its header/value rows.
    ///
    /// Only a detail view that never appears is an error; missing rows or
    /// cells leave the matching fields empty.
    pub async fn extract<S>(&mut self, session: &mut S) -> BrowserResult<CaseDetail>
    where
        S: BrowserSession + ?Sized,
    {
        wait_for(session, &DETAIL_HEADING, self.timeout).await?;
        let table = self.wait_for_fresh_table(session).await?;

        let mut detail = CaseDetail::default();
        let rows = session.find_within(&table, ROW).await?;
        for row in &rows {
            match read_row(session, row).await {
                Ok(Some((header, value))) => {
                    if let Some(field) = classify_header(&header) {
                        if !value.is_empty() {
                            detail.set(field, value);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Skipping unreadable detail row: {}", e),
            }
        }

        match session.find_within(&table, IMAGE).await {
            Ok(images) => {
                for image in &images {
                    match session.read_attribute(image, "src").await {
                        Ok(Some(src)) if !src.trim().is_empty() => {
                            detail.image_sources.push(src.trim().to_string())
                        }
                        Ok(_) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => debug!("Skipping unreadable image: {}", e),
                    }
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Detail images not readable: {}", e),
        }

        debug!(
            "Read {} of 4 detail fields, {} images",
            detail.populated_fields(),
            detail.image_sources.len()
        );
        Ok(detail)
    }

    /// The detail table, once its text differs from the previous case's.
    ///
    /// A table that stays identical for the whole timeout is accepted as is.
    async fn wait_for_fresh_table<S>(&mut self, session: &mut S) -> BrowserResult<S::Element>
    where
        S: BrowserSession + ?Sized,
    {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Backoff::default();
        loop {
            let table = wait_for(session, &DETAIL_TABLE, self.timeout).await?;
            let text = session.read_text(&table).await?;
            if self.last_table_text.as_deref() != Some(text.as_str()) {
                self.last_table_text = Some(text);
                return Ok(table);
            }
            if Instant::now() >= deadline {
                debug!("Detail table unchanged since previous case");
                return Ok(table);
            }
            tokio::time::sleep(backoff.next_delay(deadline)).await;
        }
    }
}

async fn read_row<S>(session: &mut S, row: &S::Element) -> BrowserResult<Option<(String, String)>>
where
    S: BrowserSession + ?Sized,
{
    let Some(header) = session.find_within(row, HEADER_CELL).await?.into_iter().next() else {
        return Ok(None);
    };
    let Some(value) = session.find_within(row, DATA_CELL).await?.into_iter().next() else {
        return Ok(None);
    };
    let header = session.read_text(&header).await?;
    let value = session.read_text(&value).await?;
    Ok(Some((header.trim().to_string(), value.trim().to_string())))
}
