//! Wall thickness estimation by inward ray casting.
//!
//! Samples points on the surface and casts each one along its negated face
//! normal; the distance to the first surface hit is the local wall
//! thickness. This is a statistical lower bound over the sampled rays, not a
//! guaranteed minimum.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::mesh::TriangleMesh;

/// Number of surface samples used by the worker
pub const DEFAULT_SAMPLE_COUNT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallThickness {
    pub min: f64,
    pub avg: f64,
    /// Rays that found an opposite surface
    pub hits: usize,
}

/// Estimate wall thickness from `samples` inward rays.
///
/// Returns `None` when no ray hits anything, so callers report the metric
/// as unknown rather than zero or infinity.
pub fn estimate_wall_thickness(
    mesh: &TriangleMesh,
    samples: usize,
    seed: u64,
) -> Option<WallThickness> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let points = mesh.sample_surface_points(samples, &mut rng);
    if points.is_empty() {
        debug!("No surface samples; wall thickness unknown");
        return None;
    }

    let caster = mesh.ray_caster();
    let distances: Vec<f64> = points
        .iter()
        .filter_map(|s| caster.nearest_hit(&s.point, &(-s.normal), Some(s.face)))
        .collect();

    if distances.is_empty() {
        debug!(samples = points.len(), "No inward ray hit; wall thickness unknown");
        return None;
    }

    let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let avg = distances.iter().sum::<f64>() / distances.len() as f64;

    info!(
        samples = points.len(),
        hits = distances.len(),
        min_thickness = format!("{:.3}", min),
        "Wall thickness estimated"
    );

    Some(WallThickness {
        min,
        avg,
        hits: distances.len(),
    })
}
