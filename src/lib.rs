//! DFM Core - Geometry Analysis Worker
//!
//! Turns a fabrication file (mesh, CAD solid or 2D drawing) into
//! manufacturing metrics, DFM issues and a bounded risk score.
//!
//! # Guarantees
//! 1. Thresholds are contractual constants with strict comparisons.
//! 2. Estimates are seeded from the file identity, never the clock.
//! 3. Solid and drawing analysis always produce metrics; mesh failures propagate.
//! 4. Cache and job stores are optional and never fail an analysis.
//! 5. One cached result per fingerprint.

pub mod request;
pub mod metrics;
pub mod raycast;
pub mod mesh;
pub mod thickness;
pub mod overhang;
pub mod solid;
pub mod drawing;
pub mod mock;
pub mod extract;
pub mod rules;
pub mod risk;
pub mod hashing;
pub mod store;
pub mod cache;
pub mod fetch;
pub mod config;
pub mod pipeline;

pub use request::{AnalysisOptions, AnalysisRequest, FileType, GeometryFamily, ProcessType};
pub use metrics::{BoundingBox, GeometryMetrics};
pub use rules::{detect_issues, DfmIssue, IssueKind, RuleEngine, Severity};
pub use risk::risk_score;
pub use hashing::{canonical_json, compute_fingerprint};
pub use store::{DirectoryStore, KeyValueStore, MemoryStore, StoreError};
pub use cache::{JobRecord, JobStatus, JobTracker, ResultCache};
pub use fetch::{DefaultFetcher, FetchError, FetchedFile, Fetcher};
pub use config::AnalyzerConfig;
pub use solid::{SolidKernel, SolidModel};
pub use pipeline::{AnalysisError, AnalysisPipeline, AnalysisResult, BatchItem, BatchStatus};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
