//! Geometry Metrics - The canonical record every family reduces to
//!
//! Optional fields are absent (not zero) when the family or process
//! cannot compute them. Absent means unknown, never "no issue".

use serde::{Deserialize, Serialize};

pub const MM3_PER_CM3: f64 = 1000.0;
pub const MM2_PER_CM2: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BoundingBox {
    /// Negative extents are clamped to zero.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.max(0.0),
            y: y.max(0.0),
            z: z.max(0.0),
        }
    }

    pub fn from_extents(extents: [f64; 3]) -> Self {
        Self::new(extents[0], extents[1], extents[2])
    }

    pub fn min_dimension(&self) -> f64 {
        self.x.min(self.y).min(self.z)
    }

    pub fn rounded(&self) -> Self {
        Self::new(round_to(self.x, 1), round_to(self.y, 1), round_to(self.z, 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryMetrics {
    pub volume_cm3: f64,
    pub surface_area_cm2: f64,
    pub bbox_mm: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_cut_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holes_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overhang_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_thickness_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_thickness_avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triangle_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_watertight: Option<bool>,
    /// Drawing entities seen (drawings only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<u32>,
    /// Shortest single cut feature (drawings only, mm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_feature_mm: Option<f64>,
    /// Smallest face classified as small (CAD solids only, mm²)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_face_area_mm2: Option<f64>,
    /// Concave edges a round cutter cannot reach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharp_edge_count: Option<u32>,
}

impl GeometryMetrics {
    /// Base record with every optional field absent. Values are rounded.
    pub fn new(volume_cm3: f64, surface_area_cm2: f64, bbox_mm: BoundingBox) -> Self {
        Self {
            volume_cm3: round_to(volume_cm3.max(0.0), 2),
            surface_area_cm2: round_to(surface_area_cm2.max(0.0), 2),
            bbox_mm: bbox_mm.rounded(),
            length_cut_mm: None,
            holes_count: None,
            overhang_area: None,
            wall_thickness_min: None,
            wall_thickness_avg: None,
            triangle_count: None,
            is_watertight: None,
            entity_count: None,
            min_feature_mm: None,
            min_face_area_mm2: None,
            sharp_edge_count: None,
        }
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
