// ==============================================================================
// uploads.rs - VCF Storage
// ==============================================================================
// Description: Writes validated VCF uploads into the upload directory
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::Result;
use crate::validator::{stored_vcf_name, ValidatedFile};

/// Persist a validated upload as `{owner}_{identity}_{hex}{ext}`
pub async fn store_vcf(
    upload_dir: &Path,
    owner_id: i64,
    identity: &str,
    validated: &ValidatedFile,
    data: &[u8],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(upload_dir).await?;

    let stored_name = stored_vcf_name(owner_id, identity, &validated.dotted_extension());
    let path = upload_dir.join(&stored_name);

    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;

    info!(
        "Stored VCF {} as {} ({} bytes, sha256 {})",
        validated.original_name, stored_name, validated.size, validated.hash_sha256
    );

    Ok(path)
}

/// Best-effort removal of a stored file (rollback after a failed insert)
pub async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove {:?}: {}", path, e);
    }
}
