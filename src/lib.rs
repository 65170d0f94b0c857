//! Acquisition of HS classification cases from the Korea Customs Service
//! UNIPASS portal.

pub mod browser;
pub mod config;
pub mod models;
pub mod scrapers;
pub mod storage;
