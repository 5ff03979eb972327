//! Configuration Module
//!
//! This module reads ingestion limits from environment variables, provides
//! sensible defaults, and validates key security parameters such as maximum
//! file sizes and decompression limits. Decoding attacker-supplied archives
//! is the only unbounded step of an analysis; these limits bound it.

use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: usize,
    pub max_decompressed_size: usize,
    pub max_files_in_zip: usize,
    pub max_compression_ratio: f64,
    pub max_filename_length: usize,
}

impl Config {
    /// Creates a new configuration by reading environment variables.
    /// If a variable is missing or empty, a default value is used.
    pub fn new() -> Result<Self> {
        // Read max file size from env or use default 10MB.
        let max_file_size = env::var("DMARC_MAX_FILE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);

        if max_file_size > 500_000_000 {
            return Err(anyhow::anyhow!("Max file size too large (500MB limit)"));
        }

        let max_decompressed_size = env::var("DMARC_MAX_DECOMPRESSED_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024);

        let max_files_in_zip = env::var("DMARC_MAX_FILES_IN_ZIP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let max_compression_ratio = env::var("DMARC_MAX_COMPRESSION_RATIO")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000.0);

        let max_filename_length = env::var("DMARC_MAX_FILENAME_LENGTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256);

        Ok(Config {
            max_file_size,
            max_decompressed_size,
            max_files_in_zip,
            max_compression_ratio,
            max_filename_length,
        })
    }
}
