//! Result Cache and Job Tracker
//!
//! Two keyspaces over one injected store:
//! - `analysis:<fingerprint>` holds at most one result per fingerprint.
//! - `job:<id>` records the outcome of a tracked request.
//!
//! Job records are observational only and never consulted for cache hits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::hashing::canonical_json;
use crate::pipeline::AnalysisResult;
use crate::store::{KeyValueStore, StoreError};
use crate::ENGINE_VERSION;

pub const DEFAULT_CACHE_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_JOB_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    engine_version: String,
    result: AnalysisResult,
}

/// Entries written by an engine with different rules are not reused.
fn compatible_engine(stored: &str) -> bool {
    match (semver::Version::parse(stored), semver::Version::parse(ENGINE_VERSION)) {
        (Ok(a), Ok(b)) => a.major == b.major && a.minor == b.minor,
        _ => false,
    }
}

#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(fingerprint: &str) -> String {
        format!("analysis:{}", fingerprint)
    }

    /// Stored result annotated as cached, or `None` on a miss.
    pub fn lookup(&self, fingerprint: &str) -> Result<Option<AnalysisResult>, StoreError> {
        let Some(raw) = self.store.get(&Self::key(fingerprint))? else {
            return Ok(None);
        };
        let entry: CachedEntry = serde_json::from_str(&raw)?;
        if !compatible_engine(&entry.engine_version) {
            debug!(stored = %entry.engine_version, "Ignoring cache entry from another engine version");
            return Ok(None);
        }
        let mut result = entry.result;
        result.cached = true;
        Ok(Some(result))
    }

    pub fn put(&self, fingerprint: &str, result: &AnalysisResult) -> Result<(), StoreError> {
        let entry = CachedEntry {
            engine_version: ENGINE_VERSION.to_string(),
            result: AnalysisResult {
                cached: false,
                ..result.clone()
            },
        };
        self.store
            .set_ex(&Self::key(fingerprint), &canonical_json(&entry)?, self.ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    fn new(job_id: &str, status: JobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            updated_at: Utc::now(),
            result: None,
            error: None,
        }
    }

    pub fn completed(job_id: &str, result: AnalysisResult) -> Self {
        Self {
            result: Some(result),
            ..Self::new(job_id, JobStatus::Completed)
        }
    }

    pub fn failed(job_id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(job_id, JobStatus::Failed)
        }
    }

    pub fn pending(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Pending)
    }
}

#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl JobTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(job_id: &str) -> String {
        format!("job:{}", job_id)
    }

    pub fn record(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.store.set_ex(
            &Self::key(&record.job_id),
            &serde_json::to_string(record)?,
            self.ttl,
        )
    }

    pub fn mark_pending(&self, job_id: &str) -> Result<(), StoreError> {
        self.record(&JobRecord::pending(job_id))
    }

    /// `None` when the job was never tracked or its record expired.
    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        self.store
            .get(&Self::key(job_id))?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BoundingBox, GeometryMetrics};
    use crate::store::MemoryStore;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            metrics: GeometryMetrics::new(12.5, 40.0, BoundingBox::new(10.0, 20.0, 30.0)),
            issues: Vec::new(),
            risk_score: 0,
            processing_time_ms: 42,
            cached: false,
        }
    }

    #[test]
    fn test_cache_roundtrip_flips_cached() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()), Duration::hours(1));
        assert!(cache.lookup("fp").unwrap().is_none());

        let result = sample_result();
        cache.put("fp", &result).unwrap();
        let hit = cache.lookup("fp").unwrap().unwrap();
        assert!(hit.cached);
        assert_eq!(hit.metrics, result.metrics);
        assert_eq!(hit.processing_time_ms, 42);
    }

    #[test]
    fn test_stale_engine_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let entry = CachedEntry {
            engine_version: "0.1.0".to_string(),
            result: sample_result(),
        };
        store
            .set_ex("analysis:fp", &serde_json::to_string(&entry).unwrap(), Duration::hours(1))
            .unwrap();
        let cache = ResultCache::new(store, Duration::hours(1));
        assert!(cache.lookup("fp").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_ex("analysis:fp", "not json", Duration::hours(1)).unwrap();
        let cache = ResultCache::new(store, Duration::hours(1));
        assert!(cache.lookup("fp").is_err());
    }

    #[test]
    fn test_job_lifecycle() {
        let jobs = JobTracker::new(Arc::new(MemoryStore::new()), Duration::hours(24));
        assert!(jobs.get("j1").unwrap().is_none());

        jobs.mark_pending("j1").unwrap();
        assert_eq!(jobs.get("j1").unwrap().unwrap().status, JobStatus::Pending);

        jobs.record(&JobRecord::completed("j1", sample_result())).unwrap();
        let record = jobs.get("j1").unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.result.unwrap().risk_score, 0);

        jobs.record(&JobRecord::failed("j2", "download failed")).unwrap();
        let failed = jobs.get("j2").unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("download failed"));
    }

    #[test]
    fn test_job_keyspace_separate_from_cache() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let jobs = JobTracker::new(Arc::clone(&store), Duration::hours(24));
        let cache = ResultCache::new(store, Duration::hours(1));
        jobs.record(&JobRecord::completed("fp", sample_result())).unwrap();
        assert!(cache.lookup("fp").unwrap().is_none());
    }
}
