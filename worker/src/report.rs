// ==============================================================================
// report.rs - Exomiser Report Discovery
// ==============================================================================
// Description: Locates the HTML report Exomiser wrote for an individual
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Newest `.html` file in `results_dir` whose name contains `identity`.
///
/// Exomiser names its output after the output prefix in the analysis
/// config, so the match is a plain substring test on the file name.
pub async fn find_report(results_dir: &Path, identity: &str) -> Option<PathBuf> {
    if identity.is_empty() {
        return None;
    }

    let mut entries = match tokio::fs::read_dir(results_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan results directory {:?}: {}", results_dir, e);
            return None;
        }
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(identity) || !name.to_lowercase().ends_with(".html") {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, entry.path()));
        }
    }

    let found = newest.map(|(_, path)| path);
    debug!("Report for {}: {:?}", identity, found);
    found
}

/// Download name `{stem of original upload}_analysis.html`
pub fn download_name(original_filename: Option<&str>, identity: &str) -> String {
    let stem = original_filename
        .map(strip_vcf_extension)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(identity);
    format!("{}_analysis.html", stem)
}

fn strip_vcf_extension(name: &str) -> &str {
    let lower = name.to_lowercase();
    for ext in [".vcf.gz", ".vcf", ".gz"] {
        if lower.ends_with(ext) {
            return &name[..name.len() - ext.len()];
        }
    }
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_newest_matching_html_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("P0001_old.html"), "old").unwrap();
        std::fs::write(dir.path().join("P0001.json"), "{}").unwrap();
        std::fs::write(dir.path().join("P0002.html"), "other").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(dir.path().join("P0001_new.html"), "new").unwrap();

        let old = std::fs::File::options()
            .write(true)
            .open(dir.path().join("P0001_old.html"))
            .unwrap();
        old.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();

        let found = find_report(dir.path(), "P0001").await.unwrap();
        assert_eq!(found.file_name().unwrap(), "P0001_new.html");
    }

    #[tokio::test]
    async fn test_no_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("P0002.html"), "other").unwrap();
        assert!(find_report(dir.path(), "P0001").await.is_none());
        assert!(find_report(&dir.path().join("missing"), "P0001").await.is_none());
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name(Some("trio.vcf.gz"), "P0001"), "trio_analysis.html");
        assert_eq!(download_name(Some("sample.VCF"), "P0001"), "sample_analysis.html");
        assert_eq!(download_name(None, "P0001"), "P0001_analysis.html");
    }
}
