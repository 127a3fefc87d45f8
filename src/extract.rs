//! Metric Extraction - family dispatch and fallback chains
//!
//! Each family has an ordered list of strategies. The first one that
//! succeeds wins; failures are logged and the next strategy is tried.
//! Solid and drawing chains end in the mock estimator and cannot fail.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::drawing::{drawing_metrics, Drawing};
use crate::mesh::{mesh_metrics, TriangleMesh};
use crate::metrics::GeometryMetrics;
use crate::mock;
use crate::request::{FileType, GeometryFamily, ProcessType};
use crate::solid::{solid_metrics, SolidKernel};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Backend unavailable: {0}")]
    Unavailable(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File contains no geometry")]
    EmptyGeometry,
}

/// A downloaded file tagged with the family that must interpret it.
#[derive(Debug, Clone, Copy)]
pub enum GeometryInput<'a> {
    Mesh(&'a Path),
    Solid(&'a Path),
    Drawing(&'a Path),
}

impl<'a> GeometryInput<'a> {
    pub fn new(file_type: FileType, path: &'a Path) -> Self {
        match file_type.family() {
            GeometryFamily::Mesh => Self::Mesh(path),
            GeometryFamily::Solid => Self::Solid(path),
            GeometryFamily::Drawing => Self::Drawing(path),
        }
    }

    pub fn family(&self) -> GeometryFamily {
        match self {
            Self::Mesh(_) => GeometryFamily::Mesh,
            Self::Solid(_) => GeometryFamily::Solid,
            Self::Drawing(_) => GeometryFamily::Drawing,
        }
    }

    pub fn path(&self) -> &'a Path {
        match self {
            Self::Mesh(p) | Self::Solid(p) | Self::Drawing(p) => p,
        }
    }
}

/// Everything a strategy needs besides the file itself.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext {
    pub process: ProcessType,
    pub material_thickness: f64,
    /// Stable seed derived from the file identity
    pub seed: u64,
    pub wall_thickness_samples: usize,
}

/// One way of turning a file into metrics.
pub trait MetricStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, path: &Path, ctx: &ExtractionContext) -> Result<GeometryMetrics, ProviderError>;
}

pub struct StlMeshStrategy;

impl MetricStrategy for StlMeshStrategy {
    fn name(&self) -> &'static str { "stl_mesh" }

    fn attempt(&self, path: &Path, ctx: &ExtractionContext) -> Result<GeometryMetrics, ProviderError> {
        let mesh = TriangleMesh::load(path)?;
        Ok(mesh_metrics(&mesh, ctx.process, ctx.wall_thickness_samples, ctx.seed))
    }
}

pub struct SolidKernelStrategy(pub Arc<dyn SolidKernel>);

impl MetricStrategy for SolidKernelStrategy {
    fn name(&self) -> &'static str { self.0.name() }

    fn attempt(&self, path: &Path, ctx: &ExtractionContext) -> Result<GeometryMetrics, ProviderError> {
        let model = self.0.load(path)?;
        solid_metrics(model.as_ref(), ctx.process)
    }
}

pub struct DxfStrategy;

impl MetricStrategy for DxfStrategy {
    fn name(&self) -> &'static str { "dxf" }

    fn attempt(&self, path: &Path, ctx: &ExtractionContext) -> Result<GeometryMetrics, ProviderError> {
        let drawing = Drawing::load_dxf(path)?;
        Ok(drawing_metrics(&drawing, ctx.material_thickness))
    }
}

pub struct MockStrategy(pub GeometryFamily);

impl MetricStrategy for MockStrategy {
    fn name(&self) -> &'static str { "mock" }

    fn attempt(&self, _path: &Path, ctx: &ExtractionContext) -> Result<GeometryMetrics, ProviderError> {
        Ok(mock::estimate(self.0, ctx.seed, ctx.process, ctx.material_thickness))
    }
}

/// Ordered strategies for one family.
///
/// mesh: STL only, failures propagate.
/// solid: CAD kernel (when configured), then the file read as a mesh, then mock.
/// drawing: DXF, then mock.
pub fn fallback_chain(
    family: GeometryFamily,
    kernel: Option<&Arc<dyn SolidKernel>>,
) -> Vec<Box<dyn MetricStrategy>> {
    match family {
        GeometryFamily::Mesh => vec![Box::new(StlMeshStrategy)],
        GeometryFamily::Solid => {
            let mut chain: Vec<Box<dyn MetricStrategy>> = Vec::new();
            if let Some(kernel) = kernel {
                chain.push(Box::new(SolidKernelStrategy(Arc::clone(kernel))));
            }
            chain.push(Box::new(StlMeshStrategy));
            chain.push(Box::new(MockStrategy(GeometryFamily::Solid)));
            chain
        }
        GeometryFamily::Drawing => vec![
            Box::new(DxfStrategy),
            Box::new(MockStrategy(GeometryFamily::Drawing)),
        ],
    }
}

/// Run strategies in order and keep the first success.
pub fn run_chain(
    chain: &[Box<dyn MetricStrategy>],
    path: &Path,
    ctx: &ExtractionContext,
) -> Result<GeometryMetrics, ProviderError> {
    let mut last_error = ProviderError::Unavailable("no strategy configured");
    for strategy in chain {
        match strategy.attempt(path, ctx) {
            Ok(metrics) => {
                debug!(strategy = strategy.name(), "Metrics extracted");
                return Ok(metrics);
            }
            Err(e) => {
                warn!(strategy = strategy.name(), error = %e, "Strategy failed, falling back");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Single dispatch point from a tagged input to metrics.
pub fn extract_metrics(
    input: GeometryInput<'_>,
    ctx: &ExtractionContext,
    kernel: Option<&Arc<dyn SolidKernel>>,
) -> Result<GeometryMetrics, ProviderError> {
    let chain = fallback_chain(input.family(), kernel);
    run_chain(&chain, input.path(), ctx)
}
