//! Report Ingestion Module
//!
//! This module extracts report XML from the file formats reporters actually
//! send: ZIP archives, GZIP streams, and bare XML. It enforces security
//! measures including file size limits, maximum decompressed size, file
//! count, compression ratio, filename length, and path traversal prevention.
use crate::config::Config;
use crate::error::{DmarcError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

/// Extracts report documents from the file at `path`.
///
/// The handler is chosen by file extension. Every limit in `config` is
/// applied before content is returned; a violated limit aborts the whole
/// extraction.
pub fn extract_report<P: AsRef<Path>>(path: P, config: &Config) -> Result<Vec<String>> {
    let file = File::open(&path)?;
    if file.metadata()?.len() > config.max_file_size as u64 {
        return Err(DmarcError::FileTooLarge(format!(
            "{} exceeds the {} byte limit",
            path.as_ref().display(),
            config.max_file_size
        )));
    }

    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" => read_zip_archive(file, config),
        "gz" => read_gzip(file, config),
        "xml" => read_xml(file),
        _ => Err(DmarcError::UnsupportedFile(format!(
            "unsupported report file extension: {}",
            if ext.is_empty() { "(none)" } else { ext.as_str() }
        ))),
    }
}

fn read_zip_archive(file: File, config: &Config) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(file)?;
    if archive.len() > config.max_files_in_zip {
        return Err(DmarcError::Format(format!(
            "archive contains {} files, limit is {}",
            archive.len(),
            config.max_files_in_zip
        )));
    }
    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains("..") || name.starts_with('/') || name.starts_with('\\') {
            return Err(DmarcError::Format(format!(
                "path traversal attempt detected: {}",
                name
            )));
        }
        if name.len() > config.max_filename_length {
            return Err(DmarcError::Format(format!(
                "entry filename too long: {} bytes",
                name.len()
            )));
        }
        if entry.compressed_size() > 0 {
            let ratio = entry.size() as f64 / entry.compressed_size() as f64;
            if ratio > config.max_compression_ratio {
                return Err(DmarcError::Format(format!(
                    "suspicious compression ratio: {:.2}",
                    ratio
                )));
            }
        }
        if entry.size() > config.max_decompressed_size as u64 {
            return Err(DmarcError::FileTooLarge(format!(
                "decompressed size of entry {} too large",
                name
            )));
        }
        let mut contents = String::with_capacity(entry.size() as usize);
        entry.read_to_string(&mut contents)?;
        extracted.push(contents);
    }
    log::debug!("extracted {} documents from archive", extracted.len());
    Ok(extracted)
}

fn read_gzip(file: File, config: &Config) -> Result<Vec<String>> {
    // The decoder is capped one byte past the limit so an oversized stream
    // is detectable without decompressing it in full.
    let limit = config.max_decompressed_size as u64;
    let mut decoder = GzDecoder::new(BufReader::new(file)).take(limit + 1);
    let mut contents = String::new();
    decoder.read_to_string(&mut contents)?;
    if contents.len() as u64 > limit {
        return Err(DmarcError::FileTooLarge(
            "decompressed report too large".to_string(),
        ));
    }
    Ok(vec![contents])
}

fn read_xml(file: File) -> Result<Vec<String>> {
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(vec![contents])
}
