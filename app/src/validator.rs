// ==============================================================================
// validator.rs - VCF Upload Validation
// ==============================================================================
// Description: Validates uploaded VCF files before they are written to disk
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// Security: Allowlist-only file types, magic number verification, size limits
// ==============================================================================

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::security::random_hex_suffix;

pub const MAX_VCF_FILE_SIZE: usize = 500 * 1024 * 1024; // 500 MB

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub original_name: String,
    pub safe_name: String,
    /// "vcf" or "vcf.gz"
    pub extension: String,
    pub size: usize,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

impl ValidatedFile {
    /// Extension including the leading dot, as used in stored filenames
    pub fn dotted_extension(&self) -> String {
        format!(".{}", self.extension)
    }
}

pub struct FileValidator {
    max_file_size: usize,
    allowed_types: HashMap<&'static str, Vec<u8>>,
}

impl FileValidator {
    pub fn new() -> Self {
        let mut allowed_types = HashMap::new();

        // Plain-text VCF (no magic number)
        allowed_types.insert("vcf", vec![]);

        // Gzip/BGZF compressed VCF
        allowed_types.insert("vcf.gz", GZIP_MAGIC.to_vec());

        Self {
            max_file_size: MAX_VCF_FILE_SIZE,
            allowed_types,
        }
    }

    #[cfg(test)]
    fn with_max_size(max_file_size: usize) -> Self {
        Self {
            max_file_size,
            ..Self::new()
        }
    }

    /// Validate an uploaded VCF held in memory
    pub fn validate_upload(&self, filename: &str, data: &[u8]) -> Result<ValidatedFile> {
        info!("Validating VCF upload: {}", filename);

        // 1. Size check (BEFORE any processing)
        let size = data.len();
        if size == 0 {
            return Err(CoreError::validation("VCF file is empty"));
        }
        if size > self.max_file_size {
            return Err(CoreError::validation(format!(
                "File too large: {} bytes (max: {} bytes)",
                size, self.max_file_size
            )));
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Filename sanitization
        let safe_name = sanitize_filename(filename)?;
        debug!("Sanitized filename: {}", safe_name);

        // 3. Extension check (allowlist)
        let ext = vcf_extension(&safe_name).ok_or_else(|| {
            CoreError::validation(format!(
                "Invalid file type for {}: expected .vcf or .vcf.gz",
                filename
            ))
        })?;
        debug!("Extension check passed: .{}", ext);

        // 4. Magic number verification
        if let Some(expected_magic) = self.allowed_types.get(ext) {
            if !expected_magic.is_empty() && !data.starts_with(expected_magic) {
                return Err(CoreError::validation(format!(
                    "Magic number mismatch for .{} file",
                    ext
                )));
            }
        }

        // 5. Content validation (fileformat header)
        validate_vcf_header(data, ext)?;
        debug!("Content validation passed");

        // 6. Compute SHA-256 hash
        let hash = compute_sha256(data);
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            original_name: filename.to_string(),
            safe_name,
            extension: ext.to_string(),
            size,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Stored upload name: `{owner}_{identity}_{8 hex}{ext}`
pub fn stored_vcf_name(owner_id: i64, identity: &str, dotted_extension: &str) -> String {
    let identity = sanitize_component(identity);
    format!(
        "{}_{}_{}{}",
        owner_id,
        identity,
        random_hex_suffix(8),
        dotted_extension
    )
}

pub fn sanitize_filename(name: &str) -> Result<String> {
    // Remove path separators, null bytes, control characters
    let safe = name
        .replace(['/', '\\', '\0'], "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .collect::<String>();

    // Limit length to 255 characters
    let truncated: String = safe.chars().take(255).collect();

    if truncated.is_empty() {
        return Err(CoreError::validation("Invalid filename after sanitization"));
    }

    if truncated.starts_with('.') {
        return Err(CoreError::validation("Filename cannot start with '.'"));
    }

    Ok(truncated)
}

fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Compound-aware VCF extension of a filename
pub fn vcf_extension(filename: &str) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".vcf.gz") {
        Some("vcf.gz")
    } else if lower.ends_with(".vcf") {
        Some("vcf")
    } else {
        None
    }
}

fn validate_vcf_header(data: &[u8], ext: &str) -> Result<()> {
    let first_line = if ext == "vcf.gz" {
        let decoder = flate2::read::GzDecoder::new(data);
        read_first_line(BufReader::new(decoder))?
    } else {
        read_first_line(BufReader::new(data))?
    };

    if !first_line.starts_with("##fileformat=VCF") {
        return Err(CoreError::validation(
            "Invalid VCF format: missing fileformat header",
        ));
    }

    Ok(())
}

fn read_first_line<R: BufRead>(reader: R) -> Result<String> {
    let first = reader
        .lines()
        .next()
        .ok_or_else(|| CoreError::validation("VCF file is empty"))?
        .map_err(|e| CoreError::validation(format!("Unreadable VCF file: {}", e)))?;
    Ok(first.trim_start_matches('\u{feff}').to_string())
}

fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
