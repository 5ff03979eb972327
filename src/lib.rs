//! dmarc-triage Library
//!
//! This library provides the core functionality for dmarc-triage: ingestion
//! limits, error handling, data models, extraction of report files from
//! compressed archives, XML parsing, and the classification and aggregation
//! pipeline that turns one DMARC aggregate report into a per-outcome summary.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod models;
pub mod xml_parser;
pub mod zip_handler;

pub use analyzer::analyze_report;
pub use config::Config;
pub use zip_handler::extract_report;
