//! Analyzer configuration
//!
//! Operational knobs only. DFM thresholds live in `rules` and are fixed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::cache::{DEFAULT_CACHE_TTL_SECS, DEFAULT_JOB_TTL_SECS};
use crate::request::DEFAULT_MATERIAL_THICKNESS;
use crate::thickness::DEFAULT_SAMPLE_COUNT;

/// Longest retention accepted for cache entries and job records (10 years)
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Clamp a configured retention into `0..=MAX_TTL_SECS`.
fn bounded_ttl(name: &str, secs: i64) -> chrono::Duration {
    let clamped = secs.clamp(0, MAX_TTL_SECS);
    if clamped != secs {
        warn!(setting = name, configured = secs, used = clamped, "TTL out of range, clamped");
    }
    chrono::Duration::seconds(clamped)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Invalid config {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_job_ttl")]
    pub job_ttl_secs: i64,
    #[serde(default = "default_samples")]
    pub wall_thickness_samples: usize,
    #[serde(default = "default_material_thickness")]
    pub default_material_thickness: f64,
    /// Skip download and parsing, estimate every family from the URL
    #[serde(default)]
    pub estimate_only: bool,
    /// Batch worker threads, 0 for one per core
    #[serde(default)]
    pub batch_workers: usize,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

fn default_cache_ttl() -> i64 { DEFAULT_CACHE_TTL_SECS }
fn default_job_ttl() -> i64 { DEFAULT_JOB_TTL_SECS }
fn default_samples() -> usize { DEFAULT_SAMPLE_COUNT }
fn default_material_thickness() -> f64 { DEFAULT_MATERIAL_THICKNESS }

impl AnalyzerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        bounded_ttl("cache_ttl_secs", self.cache_ttl_secs)
    }

    pub fn job_ttl(&self) -> chrono::Duration {
        bounded_ttl("job_ttl_secs", self.job_ttl_secs)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            job_ttl_secs: default_job_ttl(),
            wall_thickness_samples: default_samples(),
            default_material_thickness: default_material_thickness(),
            estimate_only: false,
            batch_workers: 0,
            store_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_is_default() {
        let config: AnalyzerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.job_ttl_secs, 86400);
        assert_eq!(config.wall_thickness_samples, 1000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"estimate_only": true, "batch_workers": 4}}"#).unwrap();
        let config = AnalyzerConfig::load(file.path()).unwrap();
        assert!(config.estimate_only);
        assert_eq!(config.batch_workers, 4);
        assert_eq!(config.default_material_thickness, 3.0);
    }

    #[test]
    fn test_ttls_are_clamped() {
        let config = AnalyzerConfig {
            cache_ttl_secs: 9_000_000_000_000,
            job_ttl_secs: -5,
            ..AnalyzerConfig::default()
        };
        assert_eq!(config.cache_ttl().num_seconds(), MAX_TTL_SECS);
        assert_eq!(config.job_ttl().num_seconds(), 0);
        assert_eq!(AnalyzerConfig::default().cache_ttl().num_seconds(), 3600);
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let missing = AnalyzerConfig::load(Path::new("/no/such/config.json")).unwrap_err();
        assert!(missing.to_string().contains("/no/such/config.json"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(AnalyzerConfig::load(file.path()), Err(ConfigError::Parse(..))));
    }
}
