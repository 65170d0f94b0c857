//! Data models for extracted classification cases.

mod case;

pub use case::{CaseImage, CaseRecord};
