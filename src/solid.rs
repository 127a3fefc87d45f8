//! CAD Solid Provider contract
//!
//! No B-rep kernel ships with the worker. A kernel is plugged in through
//! [`SolidKernel`]; without one, solids fall through to the mesh and mock
//! strategies (see `extract`).

use std::path::Path;

use crate::extract::ProviderError;
use crate::metrics::{round_to, BoundingBox, GeometryMetrics, MM2_PER_CM2, MM3_PER_CM3};
use crate::request::ProcessType;

/// Faces below this area are classified small (mm²)
pub const SMALL_FACE_AREA_MM2: f64 = 100.0;

/// Small faces below this area are counted as likely holes (mm²)
pub const HOLE_FACE_AREA_MM2: f64 = 50.0;

/// Topological dimension of a model entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Vertex = 0,
    Edge = 1,
    Face = 2,
    Volume = 3,
}

/// A loaded solid model.
pub trait SolidModel {
    /// Per-axis (min, max) corners in mm
    fn bounding_box(&self) -> ([f64; 3], [f64; 3]);

    /// Entity tags of the given dimension
    fn entities(&self, dim: Dimension) -> Vec<i32>;

    /// Volume of a 3D entity (mm³) or area of a 2D entity (mm²)
    fn mass(&self, dim: Dimension, tag: i32) -> Result<f64, ProviderError>;
}

/// A CAD kernel able to open STEP/IGES files.
pub trait SolidKernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn load(&self, path: &Path) -> Result<Box<dyn SolidModel>, ProviderError>;
}

/// Reduce a solid to canonical metrics.
pub fn solid_metrics(
    model: &dyn SolidModel,
    process: ProcessType,
) -> Result<GeometryMetrics, ProviderError> {
    let volumes = model.entities(Dimension::Volume);
    if volumes.is_empty() {
        return Err(ProviderError::EmptyGeometry);
    }

    let mut volume_mm3 = 0.0;
    for tag in volumes {
        volume_mm3 += model.mass(Dimension::Volume, tag)?;
    }

    let mut area_mm2 = 0.0;
    let mut smallest_small_face: Option<f64> = None;
    let mut holes = 0u32;
    for tag in model.entities(Dimension::Face) {
        let area = model.mass(Dimension::Face, tag)?;
        area_mm2 += area;
        if area < SMALL_FACE_AREA_MM2 {
            smallest_small_face = Some(smallest_small_face.map_or(area, |s| s.min(area)));
            if area < HOLE_FACE_AREA_MM2 {
                holes += 1;
            }
        }
    }

    let (min, max) = model.bounding_box();
    let mut metrics = GeometryMetrics::new(
        volume_mm3 / MM3_PER_CM3,
        area_mm2 / MM2_PER_CM2,
        BoundingBox::new(max[0] - min[0], max[1] - min[1], max[2] - min[2]),
    );
    metrics.min_face_area_mm2 = smallest_small_face.map(|a| round_to(a, 2));
    if process == ProcessType::Cnc3Axis {
        metrics.holes_count = Some(holes);
    }
    Ok(metrics)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// In-memory model: one volume and a list of face areas.
    pub struct FakeSolid {
        pub extents: [f64; 3],
        pub volume: f64,
        pub faces: Vec<f64>,
    }

    impl SolidModel for FakeSolid {
        fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
            ([0.0; 3], self.extents)
        }

        fn entities(&self, dim: Dimension) -> Vec<i32> {
            match dim {
                Dimension::Volume => vec![1],
                Dimension::Face => (1..=self.faces.len() as i32).collect(),
                _ => Vec::new(),
            }
        }

        fn mass(&self, dim: Dimension, tag: i32) -> Result<f64, ProviderError> {
            match dim {
                Dimension::Volume => Ok(self.volume),
                Dimension::Face => self
                    .faces
                    .get(tag as usize - 1)
                    .copied()
                    .ok_or_else(|| ProviderError::Parse(format!("no face {}", tag))),
                _ => Err(ProviderError::Parse("no mass for dimension".into())),
            }
        }
    }
}
