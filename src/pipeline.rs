//! Analysis Pipeline - Single Entry Point
//!
//! parse types -> fingerprint -> cache lookup -> fetch -> extract -> rules -> risk.
//!
//! Cache writes and job updates run as post-commit tasks once the result
//! is known. They are best-effort: a failing store is logged and the
//! caller still gets the result.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use rayon::prelude::*;

use crate::cache::{JobRecord, JobTracker, ResultCache};
use crate::config::AnalyzerConfig;
use crate::extract::{extract_metrics, ExtractionContext, GeometryInput, ProviderError};
use crate::fetch::{DefaultFetcher, FetchError, Fetcher};
use crate::hashing::{compute_fingerprint, identity_seed};
use crate::metrics::GeometryMetrics;
use crate::mock;
use crate::request::{AnalysisRequest, FileType, ProcessType};
use crate::risk::risk_score;
use crate::rules::{DfmIssue, RuleEngine};
use crate::solid::SolidKernel;
use crate::store::{KeyValueStore, StoreError};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static PIPELINE_RUN_COUNT: AtomicU32 = AtomicU32::new(0);

/// Number of analyses that went past the cache and ran extraction.
#[cfg(feature = "test-hooks")]
pub fn get_pipeline_run_count() -> u32 {
    PIPELINE_RUN_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_pipeline_run_count() {
    PIPELINE_RUN_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    UnsupportedInput(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] FetchError),

    #[error("Mesh could not be analyzed: {0}")]
    MeshProvider(#[from] ProviderError),
}

impl AnalysisError {
    /// Caller mistakes, as opposed to server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedInput(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metrics: GeometryMetrics,
    pub issues: Vec<DfmIssue>,
    pub risk_score: u32,
    pub processing_time_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failed,
}

/// One entry of a batch response, at the position of its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn from_outcome(index: usize, outcome: Result<AnalysisResult, String>) -> Self {
        match outcome {
            Ok(result) => Self {
                index,
                status: BatchStatus::Success,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                index,
                status: BatchStatus::Failed,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Side effects dispatched after the result is computed.
#[derive(Debug)]
pub enum PostCommitTask {
    CacheWrite {
        fingerprint: String,
        result: AnalysisResult,
    },
    JobUpdate(JobRecord),
}

impl PostCommitTask {
    fn name(&self) -> &'static str {
        match self {
            Self::CacheWrite { .. } => "cache_write",
            Self::JobUpdate(_) => "job_update",
        }
    }
}

/// The analysis pipeline - single entry point for all analysis operations
pub struct AnalysisPipeline {
    config: AnalyzerConfig,
    fetcher: Box<dyn Fetcher>,
    cache: Option<ResultCache>,
    jobs: Option<JobTracker>,
    solid_kernel: Option<Arc<dyn SolidKernel>>,
    rules: RuleEngine,
}

impl AnalysisPipeline {
    /// Uncached pipeline with the default transport and no CAD kernel.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            fetcher: Box::new(DefaultFetcher),
            cache: None,
            jobs: None,
            solid_kernel: None,
            rules: RuleEngine::new(),
        }
    }

    /// Use `store` for both the result cache and job records.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cache = Some(ResultCache::new(Arc::clone(&store), self.config.cache_ttl()));
        self.jobs = Some(JobTracker::new(store, self.config.job_ttl()));
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_solid_kernel(mut self, kernel: Arc<dyn SolidKernel>) -> Self {
        self.solid_kernel = Some(kernel);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one request.
    ///
    /// Unsupported types are rejected before anything else happens: no
    /// fetch, no cache access, no job record.
    pub fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let (file_type, process) = request
            .parse_types()
            .map_err(AnalysisError::UnsupportedInput)?;
        let started = Instant::now();
        let fingerprint = compute_fingerprint(file_type, process, &request.file_url);
        info!(
            %file_type,
            %process,
            job_id = request.job_id.as_deref(),
            "Analysis started"
        );

        let mut tasks = Vec::new();
        let outcome = match self.lookup_cached(&fingerprint) {
            Some(hit) => {
                info!(%fingerprint, "Cache hit");
                Ok(hit)
            }
            None => self
                .run_uncached(request, file_type, process, started)
                .inspect(|result| {
                    if self.cache.is_some() {
                        tasks.push(PostCommitTask::CacheWrite {
                            fingerprint: fingerprint.clone(),
                            result: result.clone(),
                        });
                    }
                }),
        };

        if let (Some(job_id), Some(_)) = (request.job_id.as_deref(), self.jobs.as_ref()) {
            let record = match &outcome {
                Ok(result) => JobRecord::completed(job_id, result.clone()),
                Err(e) => JobRecord::failed(job_id, e.to_string()),
            };
            tasks.push(PostCommitTask::JobUpdate(record));
        }
        self.commit(tasks);

        match &outcome {
            Ok(result) => info!(
                risk_score = result.risk_score,
                issues = result.issues.len(),
                cached = result.cached,
                "Analysis finished"
            ),
            Err(e) => warn!(error = %e, "Analysis failed"),
        }
        outcome
    }

    /// Analyze many requests concurrently.
    ///
    /// Items are returned in request order. A failing or panicking item
    /// never affects its siblings.
    pub fn analyze_batch(&self, requests: &[AnalysisRequest]) -> Vec<BatchItem> {
        if let Some(jobs) = &self.jobs {
            // Requests that will be rejected must not leave a record behind
            let tracked = requests
                .iter()
                .filter(|r| r.parse_types().is_ok())
                .filter_map(|r| r.job_id.as_deref());
            for job_id in tracked {
                if let Err(e) = jobs.mark_pending(job_id) {
                    warn!(job_id, error = %e, "Failed to register pending job");
                }
            }
        }

        let run = || {
            requests
                .par_iter()
                .enumerate()
                .map(|(index, request)| BatchItem::from_outcome(index, self.analyze_isolated(request)))
                .collect::<Vec<_>>()
        };

        match self.batch_pool() {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Stored record for `job_id`, `None` when unknown, expired or untracked.
    pub fn job_status(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        match &self.jobs {
            Some(jobs) => jobs.get(job_id),
            None => Ok(None),
        }
    }

    fn analyze_isolated(&self, request: &AnalysisRequest) -> Result<AnalysisResult, String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.analyze(request))) {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(_) => {
                warn!(file_url = %request.file_url, "Analysis panicked");
                let message = "Internal error: analysis panicked";
                // The panic skipped analyze's own job update; close the pending record
                if let (Some(job_id), Some(_)) = (request.job_id.as_deref(), self.jobs.as_ref()) {
                    self.commit(vec![PostCommitTask::JobUpdate(JobRecord::failed(job_id, message))]);
                }
                Err(message.to_string())
            }
        }
    }

    fn batch_pool(&self) -> Option<rayon::ThreadPool> {
        if self.config.batch_workers == 0 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.batch_workers)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "Falling back to the global batch pool");
                None
            }
        }
    }

    fn lookup_cached(&self, fingerprint: &str) -> Option<AnalysisResult> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(fingerprint) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, continuing uncached");
                None
            }
        }
    }

    fn run_uncached(
        &self,
        request: &AnalysisRequest,
        file_type: FileType,
        process: ProcessType,
        started: Instant,
    ) -> Result<AnalysisResult, AnalysisError> {
        #[cfg(feature = "test-hooks")]
        PIPELINE_RUN_COUNT.fetch_add(1, Ordering::SeqCst);

        let metrics = self.extract(request, file_type, process)?;
        let issues = self.rules.evaluate(&metrics, process);
        let risk_score = risk_score(&issues);

        Ok(AnalysisResult {
            metrics,
            issues,
            risk_score,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            cached: false,
        })
    }

    fn extract(
        &self,
        request: &AnalysisRequest,
        file_type: FileType,
        process: ProcessType,
    ) -> Result<GeometryMetrics, AnalysisError> {
        let ctx = ExtractionContext {
            process,
            material_thickness: request
                .options
                .material_thickness
                .unwrap_or(self.config.default_material_thickness),
            seed: identity_seed(&request.file_url),
            wall_thickness_samples: self.config.wall_thickness_samples,
        };

        if self.config.estimate_only {
            return Ok(mock::estimate(
                file_type.family(),
                ctx.seed,
                process,
                ctx.material_thickness,
            ));
        }

        // Dropped at the end of this scope on every path, removing downloads
        let file = self.fetcher.fetch(&request.file_url, file_type)?;
        let input = GeometryInput::new(file_type, file.path());
        Ok(extract_metrics(input, &ctx, self.solid_kernel.as_ref())?)
    }

    fn commit(&self, tasks: Vec<PostCommitTask>) {
        for task in tasks {
            let name = task.name();
            let outcome = match task {
                PostCommitTask::CacheWrite {
                    fingerprint,
                    result,
                } => match &self.cache {
                    Some(cache) => cache.put(&fingerprint, &result),
                    None => Ok(()),
                },
                PostCommitTask::JobUpdate(record) => match &self.jobs {
                    Some(jobs) => jobs.record(&record),
                    None => Ok(()),
                },
            };
            match outcome {
                Ok(()) => debug!(task = name, "Post-commit task done"),
                Err(e) => warn!(task = name, error = %e, "Post-commit task failed"),
            }
        }
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
