//! Site scrapers.

pub mod unipass;

pub use unipass::{RunReport, RunState, ScrapeController, ScrapeOptions};
