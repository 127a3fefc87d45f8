//! DFM Rule Engine - one rule table per process
//!
//! Rules are independent and additive. Table order is fixed so the issue
//! list is deterministic. Thresholds are contractual: strict comparisons,
//! no epsilon. A rule whose metric is absent does not fire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::GeometryMetrics;
use crate::request::ProcessType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Stable issue identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    NonWatertight,
    HighPolygonCount,
    ThinFeature,
    ThinWall,
    ExcessiveOverhang,
    TrappedVolume,
    ThinWalls,
    HighAspectRatio,
    SmallFeatures,
    DeepHoles,
    SharpCorners,
    ComplexCuttingPath,
    ThinGeometry,
    HighComplexity,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DfmIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl DfmIssue {
    fn new(kind: IssueKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            location: None,
        }
    }
}

// --- Contract constants ---

pub const MAX_TRIANGLES: u32 = 1_000_000;
pub const FFF_MIN_DIMENSION_MM: f64 = 1.0;
pub const FFF_MIN_WALL_MM: f64 = 0.8;
pub const FFF_MAX_OVERHANG_RATIO: f64 = 0.2;
pub const SLA_TRAPPED_VOLUME_CM3: f64 = 50.0;
pub const SLA_MIN_FEATURE_MM: f64 = 0.5;
pub const CNC_MIN_THICKNESS_MM: f64 = 1.0;
pub const CNC_MAX_ASPECT_RATIO: f64 = 10.0;
pub const CNC_SMALL_FEATURE_AREA_MM2: f64 = 50.0;
pub const CNC_DEEP_HOLE_DEPTH_MM: f64 = 20.0;
pub const CNC_MAX_SHARP_EDGES: u32 = 50;
pub const LASER_MIN_FEATURE_MM: f64 = 1.0;
pub const LASER_CRITICAL_FEATURE_MM: f64 = 0.5;
pub const LASER_MAX_CUT_LENGTH_MM: f64 = 5000.0;
pub const LASER_MIN_EXTENT_MM: f64 = 2.0;
pub const LASER_MAX_ENTITIES: u32 = 1000;
pub const LASER_MAX_ASPECT_RATIO: f64 = 20.0;

/// A single DFM check.
pub trait DfmRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, metrics: &GeometryMetrics) -> Option<DfmIssue>;
}

// --- Rules for every process ---

pub struct WatertightRule;

impl DfmRule for WatertightRule {
    fn name(&self) -> &'static str { "non_watertight" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        (m.is_watertight == Some(false)).then(|| {
            DfmIssue::new(
                IssueKind::NonWatertight,
                Severity::High,
                "Mesh is not watertight. This may cause issues during slicing or toolpath generation.",
            )
        })
    }
}

pub struct PolygonCountRule;

impl DfmRule for PolygonCountRule {
    fn name(&self) -> &'static str { "high_polygon_count" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let count = m.triangle_count?;
        (count > MAX_TRIANGLES).then(|| {
            DfmIssue::new(
                IssueKind::HighPolygonCount,
                Severity::Medium,
                format!("Very high polygon count ({}) may slow down processing. Consider decimating the mesh.", count),
            )
        })
    }
}

// --- FFF ---

pub struct FffMinDimensionRule;

impl DfmRule for FffMinDimensionRule {
    fn name(&self) -> &'static str { "fff_min_dimension" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let min_dim = m.bbox_mm.min_dimension();
        (min_dim < FFF_MIN_DIMENSION_MM).then(|| {
            DfmIssue::new(
                IssueKind::ThinFeature,
                Severity::High,
                format!("Minimum dimension ({:.1}mm) is below FFF printing capability", min_dim),
            )
        })
    }
}

pub struct FffWallThicknessRule;

impl DfmRule for FffWallThicknessRule {
    fn name(&self) -> &'static str { "fff_wall_thickness" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let wall = m.wall_thickness_min?;
        (wall < FFF_MIN_WALL_MM).then(|| {
            DfmIssue::new(
                IssueKind::ThinWall,
                Severity::High,
                format!("Minimum wall thickness ({:.2}mm) is too thin for reliable FFF printing", wall),
            )
        })
    }
}

pub struct FffOverhangRule;

impl DfmRule for FffOverhangRule {
    fn name(&self) -> &'static str { "fff_overhang" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let overhang = m.overhang_area?;
        if m.surface_area_cm2 <= 0.0 {
            return None;
        }
        let ratio = overhang / m.surface_area_cm2;
        (ratio > FFF_MAX_OVERHANG_RATIO).then(|| {
            DfmIssue::new(
                IssueKind::ExcessiveOverhang,
                Severity::Medium,
                format!("Large overhang area ({:.0}% of surface) will require support material", ratio * 100.0),
            )
        })
    }
}

// --- SLA ---

pub struct SlaTrappedVolumeRule;

impl DfmRule for SlaTrappedVolumeRule {
    fn name(&self) -> &'static str { "sla_trapped_volume" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        (m.volume_cm3 > SLA_TRAPPED_VOLUME_CM3 && m.is_watertight == Some(true)).then(|| {
            DfmIssue::new(
                IssueKind::TrappedVolume,
                Severity::Medium,
                "Large enclosed volume may trap uncured resin. Consider adding drainage holes.",
            )
        })
    }
}

pub struct SlaMinFeatureRule;

impl DfmRule for SlaMinFeatureRule {
    fn name(&self) -> &'static str { "sla_min_feature" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let wall = m.wall_thickness_min?;
        (wall < SLA_MIN_FEATURE_MM).then(|| {
            DfmIssue::new(
                IssueKind::ThinFeature,
                Severity::Medium,
                format!("Features below {}mm may not cure properly in SLA", SLA_MIN_FEATURE_MM),
            )
        })
    }
}

// --- CNC 3-axis ---

pub struct CncStockThicknessRule;

impl DfmRule for CncStockThicknessRule {
    fn name(&self) -> &'static str { "cnc_stock_thickness" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let z = m.bbox_mm.z;
        (z < 3.0 * CNC_MIN_THICKNESS_MM).then(|| {
            DfmIssue::new(
                IssueKind::ThinWalls,
                Severity::High,
                format!("Material thickness ({:.1}mm) may be too thin for stable machining", z),
            )
        })
    }
}

pub struct CncAspectRatioRule;

impl DfmRule for CncAspectRatioRule {
    fn name(&self) -> &'static str { "cnc_aspect_ratio" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let ratio = m.bbox_mm.x.max(m.bbox_mm.y) / m.bbox_mm.z;
        (ratio > CNC_MAX_ASPECT_RATIO).then(|| {
            DfmIssue::new(
                IssueKind::HighAspectRatio,
                Severity::Medium,
                format!("High aspect ratio ({:.1}:1) may cause workpiece deflection", ratio),
            )
        })
    }
}

pub struct CncSmallFeatureRule;

impl DfmRule for CncSmallFeatureRule {
    fn name(&self) -> &'static str { "cnc_small_features" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let area = m.min_face_area_mm2?;
        (area < CNC_SMALL_FEATURE_AREA_MM2).then(|| {
            DfmIssue::new(
                IssueKind::SmallFeatures,
                Severity::Medium,
                format!("Small features ({:.1}mm²) may require specialized tooling", area),
            )
        })
    }
}

pub struct CncDeepHoleRule;

impl DfmRule for CncDeepHoleRule {
    fn name(&self) -> &'static str { "cnc_deep_holes" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let holes = m.holes_count?;
        (holes > 0 && m.bbox_mm.z > CNC_DEEP_HOLE_DEPTH_MM).then(|| {
            DfmIssue::new(
                IssueKind::DeepHoles,
                Severity::Medium,
                format!("{} holes in a {:.1}mm deep part; ensure proper chip evacuation", holes, m.bbox_mm.z),
            )
        })
    }
}

pub struct CncSharpCornerRule;

impl DfmRule for CncSharpCornerRule {
    fn name(&self) -> &'static str { "cnc_sharp_corners" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let edges = m.sharp_edge_count?;
        (edges > CNC_MAX_SHARP_EDGES).then(|| {
            DfmIssue::new(
                IssueKind::SharpCorners,
                Severity::Low,
                format!("{} sharp internal corners; add fillets matching the tool radius", edges),
            )
        })
    }
}

// --- 2D cutting ---

pub struct CutFeatureSizeRule;

impl DfmRule for CutFeatureSizeRule {
    fn name(&self) -> &'static str { "cut_feature_size" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let feature = m.min_feature_mm?;
        if feature >= LASER_MIN_FEATURE_MM {
            return None;
        }
        let severity = if feature < LASER_CRITICAL_FEATURE_MM {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(DfmIssue::new(
            IssueKind::SmallFeatures,
            severity,
            format!(
                "Design contains features smaller than {}mm ({:.2}mm) which may not cut cleanly",
                LASER_MIN_FEATURE_MM, feature
            ),
        ))
    }
}

pub struct CutPathLengthRule;

impl DfmRule for CutPathLengthRule {
    fn name(&self) -> &'static str { "cut_path_length" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let length = m.length_cut_mm?;
        (length > LASER_MAX_CUT_LENGTH_MM).then(|| {
            DfmIssue::new(
                IssueKind::ComplexCuttingPath,
                Severity::Low,
                format!("Complex cutting path ({:.0}mm) will increase processing time and cost", length),
            )
        })
    }
}

pub struct CutExtentRule;

impl DfmRule for CutExtentRule {
    fn name(&self) -> &'static str { "cut_extent" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        (m.bbox_mm.x < LASER_MIN_EXTENT_MM || m.bbox_mm.y < LASER_MIN_EXTENT_MM).then(|| {
            DfmIssue::new(
                IssueKind::ThinGeometry,
                Severity::High,
                format!(
                    "Part extent ({:.1} x {:.1}mm) is too narrow to hold during cutting",
                    m.bbox_mm.x, m.bbox_mm.y
                ),
            )
        })
    }
}

pub struct CutEntityCountRule;

impl DfmRule for CutEntityCountRule {
    fn name(&self) -> &'static str { "cut_entity_count" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let count = m.entity_count?;
        (count > LASER_MAX_ENTITIES).then(|| {
            DfmIssue::new(
                IssueKind::HighComplexity,
                Severity::Medium,
                format!("Drawing has {} entities; consider simplifying the geometry", count),
            )
        })
    }
}

pub struct LaserAspectRatioRule;

impl DfmRule for LaserAspectRatioRule {
    fn name(&self) -> &'static str { "laser_aspect_ratio" }

    fn check(&self, m: &GeometryMetrics) -> Option<DfmIssue> {
        let ratio = m.bbox_mm.x / m.bbox_mm.y;
        (ratio > LASER_MAX_ASPECT_RATIO).then(|| {
            DfmIssue::new(
                IssueKind::HighAspectRatio,
                Severity::Low,
                format!("Long narrow part ({:.1}:1) may warp from heat during cutting", ratio),
            )
        })
    }
}

/// Evaluates the rule tables that apply to a `(metrics, process)` pair.
pub struct RuleEngine {
    general: Vec<Box<dyn DfmRule>>,
    fff: Vec<Box<dyn DfmRule>>,
    sla: Vec<Box<dyn DfmRule>>,
    cnc: Vec<Box<dyn DfmRule>>,
    cutting: Vec<Box<dyn DfmRule>>,
    laser: Vec<Box<dyn DfmRule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            general: vec![Box::new(WatertightRule), Box::new(PolygonCountRule)],
            fff: vec![
                Box::new(FffMinDimensionRule),
                Box::new(FffWallThicknessRule),
                Box::new(FffOverhangRule),
            ],
            sla: vec![Box::new(SlaTrappedVolumeRule), Box::new(SlaMinFeatureRule)],
            cnc: vec![
                Box::new(CncStockThicknessRule),
                Box::new(CncAspectRatioRule),
                Box::new(CncSmallFeatureRule),
                Box::new(CncDeepHoleRule),
                Box::new(CncSharpCornerRule),
            ],
            cutting: vec![
                Box::new(CutFeatureSizeRule),
                Box::new(CutPathLengthRule),
                Box::new(CutExtentRule),
                Box::new(CutEntityCountRule),
            ],
            laser: vec![Box::new(LaserAspectRatioRule)],
        }
    }

    /// Rules in evaluation order for this input.
    ///
    /// The cutting table applies to laser jobs and to any drawing
    /// (recognized by its cut length), whatever the process.
    pub fn rules_for(&self, metrics: &GeometryMetrics, process: ProcessType) -> Vec<&dyn DfmRule> {
        let mut tables: Vec<&Vec<Box<dyn DfmRule>>> = vec![&self.general];
        match process {
            ProcessType::Fff => tables.push(&self.fff),
            ProcessType::Sla => tables.push(&self.sla),
            ProcessType::Cnc3Axis => tables.push(&self.cnc),
            ProcessType::Laser2d => {}
        }
        if process == ProcessType::Laser2d || metrics.length_cut_mm.is_some() {
            tables.push(&self.cutting);
        }
        if process == ProcessType::Laser2d {
            tables.push(&self.laser);
        }
        tables
            .into_iter()
            .flat_map(|t| t.iter().map(|r| r.as_ref()))
            .collect()
    }

    pub fn evaluate(&self, metrics: &GeometryMetrics, process: ProcessType) -> Vec<DfmIssue> {
        self.rules_for(metrics, process)
            .into_iter()
            .filter_map(|rule| rule.check(metrics))
            .collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper over a default [`RuleEngine`].
pub fn detect_issues(metrics: &GeometryMetrics, process: ProcessType) -> Vec<DfmIssue> {
    RuleEngine::new().evaluate(metrics, process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BoundingBox;

    fn metrics(x: f64, y: f64, z: f64) -> GeometryMetrics {
        GeometryMetrics::new(10.0, 50.0, BoundingBox::new(x, y, z))
    }

    fn kinds(issues: &[DfmIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_wall_thickness_boundary_is_strict() {
        let mut m = metrics(50.0, 50.0, 50.0);
        m.wall_thickness_min = Some(0.8);
        assert!(!kinds(&detect_issues(&m, ProcessType::Fff)).contains(&IssueKind::ThinWall));

        m.wall_thickness_min = Some(0.79);
        assert!(kinds(&detect_issues(&m, ProcessType::Fff)).contains(&IssueKind::ThinWall));
    }

    #[test]
    fn test_absent_metrics_do_not_fire() {
        let m = metrics(50.0, 50.0, 50.0);
        assert!(detect_issues(&m, ProcessType::Fff).is_empty());
        assert!(detect_issues(&m, ProcessType::Sla).is_empty());
    }

    #[test]
    fn test_watertight_only_when_known_false() {
        let mut m = metrics(50.0, 50.0, 50.0);
        m.is_watertight = Some(false);
        let issues = detect_issues(&m, ProcessType::Cnc3Axis);
        assert_eq!(issues[0].kind, IssueKind::NonWatertight);
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_polygon_count_boundary() {
        let mut m = metrics(50.0, 50.0, 50.0);
        m.triangle_count = Some(1_000_000);
        assert!(detect_issues(&m, ProcessType::Fff).is_empty());
        m.triangle_count = Some(1_000_001);
        assert_eq!(kinds(&detect_issues(&m, ProcessType::Fff)), [IssueKind::HighPolygonCount]);
    }

    #[test]
    fn test_fff_overhang_ratio() {
        let mut m = metrics(50.0, 50.0, 50.0);
        m.overhang_area = Some(10.0); // exactly 20%
        assert!(detect_issues(&m, ProcessType::Fff).is_empty());
        m.overhang_area = Some(10.5);
        assert_eq!(kinds(&detect_issues(&m, ProcessType::Fff)), [IssueKind::ExcessiveOverhang]);
    }

    #[test]
    fn test_sla_rules() {
        let mut m = GeometryMetrics::new(60.0, 50.0, BoundingBox::new(50.0, 50.0, 50.0));
        m.is_watertight = Some(true);
        m.wall_thickness_min = Some(0.4);
        let issues = detect_issues(&m, ProcessType::Sla);
        assert_eq!(kinds(&issues), [IssueKind::TrappedVolume, IssueKind::ThinFeature]);
        assert_eq!(issues[1].severity, Severity::Medium);
    }

    #[test]
    fn test_sla_open_mesh_not_trapped() {
        let mut m = GeometryMetrics::new(60.0, 50.0, BoundingBox::new(50.0, 50.0, 50.0));
        m.is_watertight = Some(false);
        assert_eq!(kinds(&detect_issues(&m, ProcessType::Sla)), [IssueKind::NonWatertight]);
    }

    #[test]
    fn test_cnc_thin_plate() {
        let issues = detect_issues(&metrics(200.0, 200.0, 2.0), ProcessType::Cnc3Axis);
        assert_eq!(kinds(&issues), [IssueKind::ThinWalls, IssueKind::HighAspectRatio]);
    }

    #[test]
    fn test_cnc_holes_and_edges() {
        let mut m = metrics(100.0, 100.0, 25.0);
        m.holes_count = Some(3);
        m.min_face_area_mm2 = Some(12.0);
        m.sharp_edge_count = Some(51);
        let issues = detect_issues(&m, ProcessType::Cnc3Axis);
        assert_eq!(
            kinds(&issues),
            [IssueKind::SmallFeatures, IssueKind::DeepHoles, IssueKind::SharpCorners]
        );

        m.holes_count = Some(0);
        m.sharp_edge_count = Some(50);
        assert_eq!(kinds(&detect_issues(&m, ProcessType::Cnc3Axis)), [IssueKind::SmallFeatures]);
    }

    #[test]
    fn test_cut_feature_severity() {
        let mut m = metrics(100.0, 100.0, 3.0);
        m.length_cut_mm = Some(400.0);
        m.min_feature_mm = Some(0.7);
        let issues = detect_issues(&m, ProcessType::Laser2d);
        assert_eq!(issues[0].kind, IssueKind::SmallFeatures);
        assert_eq!(issues[0].severity, Severity::Medium);

        m.min_feature_mm = Some(0.3);
        assert_eq!(detect_issues(&m, ProcessType::Laser2d)[0].severity, Severity::High);

        m.min_feature_mm = Some(1.0);
        assert!(detect_issues(&m, ProcessType::Laser2d).is_empty());
    }

    #[test]
    fn test_laser_geometry_rules() {
        let m = metrics(500.0, 1.5, 3.0);
        let issues = detect_issues(&m, ProcessType::Laser2d);
        assert_eq!(kinds(&issues), [IssueKind::ThinGeometry, IssueKind::HighAspectRatio]);
        assert_eq!(issues[1].severity, Severity::Low);
    }

    #[test]
    fn test_drawing_rules_apply_outside_laser() {
        let mut m = metrics(400.0, 400.0, 3.0);
        m.length_cut_mm = Some(6000.0);
        m.entity_count = Some(1500);
        let issues = detect_issues(&m, ProcessType::Cnc3Axis);
        assert!(kinds(&issues).contains(&IssueKind::ComplexCuttingPath));
        assert!(kinds(&issues).contains(&IssueKind::HighComplexity));
    }

    #[test]
    fn test_engine_is_idempotent() {
        let mut m = metrics(0.5, 50.0, 50.0);
        m.wall_thickness_min = Some(0.3);
        m.overhang_area = Some(40.0);
        let engine = RuleEngine::new();
        assert_eq!(
            engine.evaluate(&m, ProcessType::Fff),
            engine.evaluate(&m, ProcessType::Fff)
        );
    }

    #[test]
    fn test_issue_serialization() {
        let issue = DfmIssue::new(IssueKind::ThinWall, Severity::High, "x");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "thin_wall");
        assert_eq!(json["severity"], "high");
        assert!(json.get("location").is_none());
        assert_eq!(IssueKind::ComplexCuttingPath.to_string(), "complex_cutting_path");
    }
}
