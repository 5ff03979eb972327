//! Error Handling Module
//!
//! This module defines custom error types for dmarc-triage using the `thiserror` crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DmarcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid report encoding: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("missing policy_published element")]
    MissingPolicy,

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),
}

pub type Result<T> = std::result::Result<T, DmarcError>;
