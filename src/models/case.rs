//! Classification case records.
//!
//! A record is created right after a detail view has been read and is never
//! mutated once it is handed to the result store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image referenced from a case's detail view and saved locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseImage {
    /// Resolved URL, or the header of an inline `data:` payload.
    pub source: String,
    pub local_path: PathBuf,
}

/// One extracted HS classification case.
///
/// Field order is the on-disk JSON key order. Absent optional values are
/// written as empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// 1-based position in visitation order across the whole run.
    pub index: u64,
    #[serde(with = "empty_as_none")]
    pub title: Option<String>,
    #[serde(rename = "hs_code", with = "empty_as_none")]
    pub code: Option<String>,
    #[serde(with = "empty_as_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<CaseImage>,
    #[serde(with = "empty_as_none")]
    pub classification_reason: Option<String>,
    #[serde(rename = "pdf_path", with = "empty_as_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(rename = "scraped_at")]
    pub extracted_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn image_paths(&self) -> Vec<String> {
        self.images
            .iter()
            .map(|img| img.local_path.display().to_string())
            .collect()
    }
}

/// `None` is written as `""` and `""` reads back as `None`.
mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: From<String>,
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok((!raw.is_empty()).then(|| T::from(raw)))
    }
}
