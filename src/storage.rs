//! Output layout and the in-memory result store.
//!
//! Records accumulate in memory in visitation order and are flushed to
//! `hs_classification_cases.json` and `hs_classification_cases.csv` on every
//! checkpoint and once more when the run ends.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::models::CaseRecord;

pub const JSON_FILENAME: &str = "hs_classification_cases.json";
pub const CSV_FILENAME: &str = "hs_classification_cases.csv";

/// UTF-8 byte order mark, so spreadsheet tools pick the right encoding.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Record index {got} appended out of order (expected {expected})")]
    OutOfOrder { expected: u64, got: u64 },
}

/// Directory tree a run writes into.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root, `images/` and `pdf/` directories.
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.images_dir())?;
        std::fs::create_dir_all(self.pdf_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("pdf")
    }

    pub fn json_path(&self) -> PathBuf {
        self.root.join(JSON_FILENAME)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.root.join(CSV_FILENAME)
    }
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Written { records: usize },
    Empty,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    index: u64,
    title: &'a str,
    hs_code: &'a str,
    description: &'a str,
    classification_reason: &'a str,
    pdf_path: String,
    images: String,
    scraped_at: String,
}

impl<'a> From<&'a CaseRecord> for CsvRow<'a> {
    fn from(record: &'a CaseRecord) -> Self {
        Self {
            index: record.index,
            title: record.title.as_deref().unwrap_or(""),
            hs_code: record.code.as_deref().unwrap_or(""),
            description: record.description.as_deref().unwrap_or(""),
            classification_reason: record.classification_reason.as_deref().unwrap_or(""),
            pdf_path: record
                .artifact_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            images: record.image_paths().join("; "),
            scraped_at: record.extracted_at.to_rfc3339(),
        }
    }
}

/// Ordered, append-only sequence of records for one run.
#[derive(Debug)]
pub struct ResultStore {
    layout: OutputLayout,
    records: Vec<CaseRecord>,
}

impl ResultStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self {
            layout,
            records: Vec::new(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Index the next appended record must carry.
    pub fn next_index(&self) -> u64 {
        self.records.len() as u64 + 1
    }

    pub fn append(&mut self, record: CaseRecord) -> Result<(), StoreError> {
        let expected = self.next_index();
        if record.index != expected {
            return Err(StoreError::OutOfOrder {
                expected,
                got: record.index,
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write JSON and CSV snapshots of everything accumulated so far.
    ///
    /// Each file is written to a temporary sibling and renamed into place, so
    /// a crash mid-flush leaves the previous snapshot intact.
    pub fn flush(&self) -> Result<FlushOutcome, StoreError> {
        if self.records.is_empty() {
            info!("No records to save");
            return Ok(FlushOutcome::Empty);
        }

        std::fs::create_dir_all(self.layout.root())?;

        let json_path = self.layout.json_path();
        write_atomically(&json_path, |file| {
            serde_json::to_writer_pretty(&mut *file, &self.records)?;
            file.write_all(b"\n")?;
            Ok(())
        })?;
        info!("Saved JSON: {}", json_path.display());

        let csv_path = self.layout.csv_path();
        write_atomically(&csv_path, |file| {
            file.write_all(UTF8_BOM)?;
            let mut writer = csv::Writer::from_writer(&mut *file);
            for record in &self.records {
                writer.serialize(CsvRow::from(record))?;
            }
            writer.flush()?;
            Ok(())
        })?;
        info!("Saved CSV: {}", csv_path.display());

        Ok(FlushOutcome::Written {
            records: self.records.len(),
        })
    }
}

fn write_atomically<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut NamedTempFile) -> Result<(), StoreError>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    write(&mut file)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
