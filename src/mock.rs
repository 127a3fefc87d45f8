//! Mock Estimator
//!
//! Plausible metrics for when no backend can measure the file. Values are
//! drawn from a generator seeded by the file identity, so the same file
//! always gets the same estimate.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::metrics::{round_to, BoundingBox, GeometryMetrics, MM2_PER_CM2, MM3_PER_CM3};
use crate::request::{GeometryFamily, ProcessType};

fn box_surface_cm2(x: f64, y: f64, z: f64) -> f64 {
    2.0 * (x * y + x * z + y * z) / MM2_PER_CM2
}

/// Printable parts: moderate size, partially hollow.
pub fn estimate_mesh(seed: u64, process: ProcessType) -> GeometryMetrics {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = rng.random_range(10.0..200.0);
    let y = rng.random_range(10.0..200.0);
    let z = rng.random_range(5.0..150.0);

    let volume = x * y * z / MM3_PER_CM3 * rng.random_range(0.3..0.8);
    let area = box_surface_cm2(x, y, z);
    let overhang_share = rng.random_range(0.0..0.3);

    let mut metrics = GeometryMetrics::new(volume, area, BoundingBox::new(x, y, z));
    if process.is_additive() {
        metrics.overhang_area = Some(round_to(metrics.surface_area_cm2 * overhang_share, 2));
    }
    metrics
}

/// Machined parts: larger, blockier stock.
pub fn estimate_solid(seed: u64, process: ProcessType) -> GeometryMetrics {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = rng.random_range(30.0..250.0);
    let y = rng.random_range(30.0..250.0);
    let z = rng.random_range(10.0..80.0);

    let volume = x * y * z / MM3_PER_CM3 * rng.random_range(0.5..0.85);
    let holes = rng.random_range(2..15u32);

    let mut metrics = GeometryMetrics::new(volume, box_surface_cm2(x, y, z), BoundingBox::new(x, y, z));
    if process == ProcessType::Cnc3Axis {
        metrics.holes_count = Some(holes);
    }
    metrics
}

/// Sheet parts: outline plus interior cuts.
pub fn estimate_drawing(seed: u64, material_thickness: f64) -> GeometryMetrics {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = rng.random_range(50.0..500.0);
    let y = rng.random_range(50.0..500.0);

    let area_mm2 = x * y * rng.random_range(0.4..0.9);
    let perimeter = 2.0 * (x + y);
    let internal_cuts = perimeter * rng.random_range(0.5..2.0);

    let mut metrics = GeometryMetrics::new(
        area_mm2 * material_thickness / MM3_PER_CM3,
        area_mm2 / MM2_PER_CM2,
        BoundingBox::new(x, y, material_thickness),
    );
    metrics.length_cut_mm = Some(round_to(perimeter + internal_cuts, 1));
    metrics
}

pub fn estimate(
    family: GeometryFamily,
    seed: u64,
    process: ProcessType,
    material_thickness: f64,
) -> GeometryMetrics {
    debug!(?family, seed, "Using mock estimate");
    match family {
        GeometryFamily::Mesh => estimate_mesh(seed, process),
        GeometryFamily::Solid => estimate_solid(seed, process),
        GeometryFamily::Drawing => estimate_drawing(seed, material_thickness),
    }
}
