// ==============================================================================
// config.rs - Portal Configuration
// ==============================================================================
// Description: Filesystem layout, Exomiser invocation and session settings
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///opt/instance/app.db?mode=rwc";

/// Directories shared by the web server and the runner
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Uploaded VCF files
    pub upload_dir: PathBuf,
    /// Generated phenopacket YAML handed to Exomiser
    pub phenopacket_dir: PathBuf,
    /// Exomiser output directory scanned for HTML reports
    pub results_dir: PathBuf,
    /// Prefix for `htsFiles[].uri` in generated phenopackets
    pub vcf_uri_prefix: String,
}

impl StoragePaths {
    pub fn under(root: &Path) -> Self {
        Self {
            upload_dir: root.join("vcf"),
            phenopacket_dir: root.join("phenopackets"),
            results_dir: root.join("results"),
            vcf_uri_prefix: "ikdrc/vcf".to_string(),
        }
    }

    /// Create all directories if missing
    pub async fn ensure(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.phenopacket_dir, &self.results_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }
}

/// How the external Exomiser CLI is invoked
#[derive(Debug, Clone)]
pub struct ExomiserConfig {
    pub java_bin: PathBuf,
    pub jar_path: PathBuf,
    pub memory_flags: Vec<String>,
    /// Static analysis YAML passed with `--analysis`
    pub analysis_config: PathBuf,
    /// Optional Spring `application.properties`
    pub application_properties: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

impl Default for ExomiserConfig {
    fn default() -> Self {
        Self {
            java_bin: PathBuf::from("java"),
            jar_path: PathBuf::from("/opt/exomiser/exomiser-cli.jar"),
            memory_flags: vec!["-Xms2g".to_string(), "-Xmx4g".to_string()],
            analysis_config: PathBuf::from("/opt/exomiser/ikdrc/exome-analysis.yml"),
            application_properties: None,
            work_dir: None,
        }
    }
}

/// Runner scheduling knobs
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_runs: usize,
    /// How long a finished run's output stays pollable
    pub output_retention: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 1,
            output_retention: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_ttl: chrono::Duration,
    pub remember_ttl: chrono::Duration,
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::hours(12),
            remember_ttl: chrono::Duration::days(30),
            secure_cookies: false,
        }
    }
}

/// Complete portal settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub server_port: u16,
    pub storage: StoragePaths,
    pub exomiser: ExomiserConfig,
    pub runner: RunnerConfig,
    pub session: SessionConfig,
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables (after `.env`)
    pub fn from_env() -> Result<Self> {
        let database_url = env_or("DATABASE_URL", DEFAULT_DATABASE_URL);

        let server_port = parse_env("SERVER_PORT", 8000u16)?;

        let storage = StoragePaths {
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "/opt/exomiser/ikdrc/vcf")),
            phenopacket_dir: PathBuf::from(env_or(
                "PHENOPACKET_DIR",
                "/opt/exomiser/ikdrc/phenopackets",
            )),
            results_dir: PathBuf::from(env_or("RESULTS_DIR", "/opt/exomiser/results")),
            vcf_uri_prefix: env_or("VCF_URI_PREFIX", "ikdrc/vcf"),
        };

        let defaults = ExomiserConfig::default();
        let exomiser = ExomiserConfig {
            java_bin: std::env::var("EXOMISER_JAVA")
                .map(PathBuf::from)
                .unwrap_or(defaults.java_bin),
            jar_path: std::env::var("EXOMISER_JAR")
                .map(PathBuf::from)
                .unwrap_or(defaults.jar_path),
            memory_flags: std::env::var("EXOMISER_MEMORY_FLAGS")
                .map(|flags| flags.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.memory_flags),
            analysis_config: std::env::var("EXOMISER_ANALYSIS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.analysis_config),
            application_properties: std::env::var("EXOMISER_APPLICATION_PROPERTIES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            work_dir: std::env::var("EXOMISER_WORK_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        let runner = RunnerConfig {
            max_concurrent_runs: parse_env("MAX_CONCURRENT_RUNS", 1usize)?.max(1),
            output_retention: Duration::from_secs(parse_env("OUTPUT_RETENTION_SECS", 1800u64)?),
        };

        let session = SessionConfig {
            session_ttl: chrono::Duration::hours(parse_env("SESSION_TTL_HOURS", 12i64)?),
            remember_ttl: chrono::Duration::days(parse_env("REMEMBER_TTL_DAYS", 30i64)?),
            secure_cookies: parse_env("SECURE_COOKIES", false)?,
        };

        // Example: CORS_ALLOWED_ORIGINS=https://exomiser.example.org,http://localhost:8000
        let cors_allowed_origins = env_or("CORS_ALLOWED_ORIGINS", "http://localhost:8000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            server_port,
            storage,
            exomiser,
            runner,
            session,
            cors_allowed_origins,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_paths_under_root() {
        let paths = StoragePaths::under(Path::new("/tmp/portal"));
        assert_eq!(paths.upload_dir, PathBuf::from("/tmp/portal/vcf"));
        assert_eq!(paths.results_dir, PathBuf::from("/tmp/portal/results"));
        assert_eq!(paths.vcf_uri_prefix, "ikdrc/vcf");
    }

    #[test]
    fn test_runner_defaults() {
        let runner = RunnerConfig::default();
        assert_eq!(runner.max_concurrent_runs, 1);
        assert_eq!(runner.output_retention, Duration::from_secs(1800));
    }

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let value: u16 = parse_env("EXOMISER_TEST_UNSET_PORT_VARIABLE", 8000).unwrap();
        assert_eq!(value, 8000);
    }

    #[tokio::test]
    async fn test_ensure_creates_directories() {
        let root = tempfile::tempdir().unwrap();
        let paths = StoragePaths::under(root.path());
        paths.ensure().await.unwrap();
        assert!(paths.upload_dir.is_dir());
        assert!(paths.phenopacket_dir.is_dir());
        assert!(paths.results_dir.is_dir());
    }
}
