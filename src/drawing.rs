//! 2D Drawing Provider
//!
//! Vector drawings reduce to cut length, extents and the smallest cut
//! feature. DXF files are read through the `dxf` crate; only the entity
//! kinds a laser actually follows are kept.

use std::f64::consts::PI;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::extract::ProviderError;
use crate::metrics::{round_to, BoundingBox, GeometryMetrics, MM2_PER_CM2, MM3_PER_CM3};

/// Extents reported for a drawing with no usable entities (mm)
pub const PLACEHOLDER_EXTENT_MM: f64 = 100.0;

/// Share of the bounding rectangle assumed to be material
pub const MATERIAL_UTILIZATION: f64 = 0.7;

/// Splines are estimated as this multiple of their control polygon length
pub const SPLINE_LENGTH_FACTOR: f64 = 1.2;

// Arc cut length is radius * |end - start|, while arc extents follow the
// counter-clockwise sweep from start to end. An arc from 350° to 10° is
// costed as 340° of cut but bounded as a 20° arc.

type Point2 = [f64; 2];

#[derive(Debug, Clone, PartialEq)]
pub enum DrawingEntity {
    Line {
        start: Point2,
        end: Point2,
    },
    Circle {
        center: Point2,
        radius: f64,
    },
    /// Angles in degrees, counter-clockwise from start to end
    Arc {
        center: Point2,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    Polyline {
        points: Vec<Point2>,
        closed: bool,
    },
    Spline {
        control_points: Vec<Point2>,
    },
}

fn distance(a: Point2, b: Point2) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

/// Lengths of consecutive segments, plus the closing one when asked.
fn segment_lengths(points: &[Point2], closed: bool) -> Vec<f64> {
    let mut lengths: Vec<f64> = points.windows(2).map(|w| distance(w[0], w[1])).collect();
    if closed && points.len() > 2 {
        lengths.push(distance(points[points.len() - 1], points[0]));
    }
    lengths
}

impl DrawingEntity {
    /// Path length the cutter travels for this entity (mm).
    pub fn cut_length(&self) -> f64 {
        match self {
            Self::Line { start, end } => distance(*start, *end),
            Self::Circle { radius, .. } => 2.0 * PI * radius,
            Self::Arc {
                radius,
                start_angle,
                end_angle,
                ..
            } => radius * (end_angle - start_angle).to_radians().abs(),
            Self::Polyline { points, closed } => segment_lengths(points, *closed).iter().sum(),
            Self::Spline { control_points } => {
                SPLINE_LENGTH_FACTOR * segment_lengths(control_points, false).iter().sum::<f64>()
            }
        }
    }

    /// Individual cut features: each segment of a polyline counts on its own.
    fn feature_sizes(&self) -> Vec<f64> {
        match self {
            Self::Circle { radius, .. } => vec![2.0 * radius],
            Self::Polyline { points, closed } => segment_lengths(points, *closed),
            other => vec![other.cut_length()],
        }
    }

    /// Points whose bounds equal the entity bounds.
    fn extent_points(&self) -> Vec<Point2> {
        match self {
            Self::Line { start, end } => vec![*start, *end],
            Self::Circle { center, radius } => vec![
                [center[0] - radius, center[1] - radius],
                [center[0] + radius, center[1] + radius],
            ],
            Self::Arc {
                center,
                radius,
                start_angle,
                end_angle,
            } => {
                let at = |deg: f64| {
                    let rad = deg.to_radians();
                    [center[0] + radius * rad.cos(), center[1] + radius * rad.sin()]
                };
                let start = start_angle.rem_euclid(360.0);
                let mut sweep = (end_angle - start_angle).rem_euclid(360.0);
                if sweep == 0.0 {
                    sweep = 360.0;
                }
                let mut points = vec![at(start), at(start + sweep)];
                for quadrant in [0.0, 90.0, 180.0, 270.0, 360.0, 450.0, 540.0, 630.0] {
                    if quadrant > start && quadrant < start + sweep {
                        points.push(at(quadrant));
                    }
                }
                points
            }
            Self::Polyline { points, .. } => points.clone(),
            Self::Spline { control_points } => control_points.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drawing {
    pub entities: Vec<DrawingEntity>,
}

impl Drawing {
    pub fn new(entities: Vec<DrawingEntity>) -> Self {
        Self { entities }
    }

    pub fn load_dxf(path: &Path) -> Result<Self, ProviderError> {
        use dxf::entities::EntityType;

        let file = File::open(path)?;
        let dxf = dxf::Drawing::load(&mut BufReader::new(file))
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut entities = Vec::new();
        let mut skipped = 0usize;
        for entity in dxf.entities() {
            let converted = match &entity.specific {
                EntityType::Line(line) => Some(DrawingEntity::Line {
                    start: [line.p1.x, line.p1.y],
                    end: [line.p2.x, line.p2.y],
                }),
                EntityType::Circle(circle) => Some(DrawingEntity::Circle {
                    center: [circle.center.x, circle.center.y],
                    radius: circle.radius,
                }),
                EntityType::Arc(arc) => Some(DrawingEntity::Arc {
                    center: [arc.center.x, arc.center.y],
                    radius: arc.radius,
                    start_angle: arc.start_angle,
                    end_angle: arc.end_angle,
                }),
                EntityType::LwPolyline(poly) => Some(DrawingEntity::Polyline {
                    points: poly.vertices.iter().map(|v| [v.x, v.y]).collect(),
                    closed: poly.flags & 1 != 0,
                }),
                EntityType::Polyline(poly) => Some(DrawingEntity::Polyline {
                    points: poly
                        .vertices()
                        .map(|v| [v.location.x, v.location.y])
                        .collect(),
                    closed: poly.flags & 1 != 0,
                }),
                EntityType::Spline(spline) => Some(DrawingEntity::Spline {
                    control_points: spline.control_points.iter().map(|p| [p.x, p.y]).collect(),
                }),
                _ => None,
            };
            match converted {
                Some(e) => entities.push(e),
                None => skipped += 1,
            }
        }

        debug!(entities = entities.len(), skipped, "Loaded DXF drawing");
        Ok(Self { entities })
    }

    pub fn total_cut_length(&self) -> f64 {
        self.entities.iter().map(DrawingEntity::cut_length).sum()
    }

    /// Union of entity extents, `None` for an empty drawing.
    pub fn extents(&self) -> Option<[f64; 2]> {
        let mut points = self.entities.iter().flat_map(DrawingEntity::extent_points);
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| {
            (
                [min[0].min(p[0]), min[1].min(p[1])],
                [max[0].max(p[0]), max[1].max(p[1])],
            )
        });
        Some([max[0] - min[0], max[1] - min[1]])
    }

    pub fn min_feature_size(&self) -> Option<f64> {
        self.entities
            .iter()
            .flat_map(DrawingEntity::feature_sizes)
            .reduce(f64::min)
    }
}

/// Reduce a drawing to canonical metrics for a sheet of `material_thickness` mm.
pub fn drawing_metrics(drawing: &Drawing, material_thickness: f64) -> GeometryMetrics {
    let [x, y] = drawing
        .extents()
        .unwrap_or([PLACEHOLDER_EXTENT_MM, PLACEHOLDER_EXTENT_MM]);

    let material_area_mm2 = x * y * MATERIAL_UTILIZATION;
    let mut metrics = GeometryMetrics::new(
        material_area_mm2 * material_thickness / MM3_PER_CM3,
        material_area_mm2 / MM2_PER_CM2,
        BoundingBox::new(x, y, material_thickness),
    );

    metrics.length_cut_mm = Some(round_to(drawing.total_cut_length(), 1));
    metrics.entity_count = Some(u32::try_from(drawing.entities.len()).unwrap_or(u32::MAX));
    metrics.min_feature_mm = drawing.min_feature_size().map(|f| round_to(f, 3));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_entity_lengths() {
        let line = DrawingEntity::Line {
            start: [0.0, 0.0],
            end: [3.0, 4.0],
        };
        assert!(approx(line.cut_length(), 5.0));

        let circle = DrawingEntity::Circle {
            center: [0.0, 0.0],
            radius: 2.0,
        };
        assert!(approx(circle.cut_length(), 4.0 * PI));

        let arc = DrawingEntity::Arc {
            center: [0.0, 0.0],
            radius: 10.0,
            start_angle: 90.0,
            end_angle: 0.0,
        };
        assert!(approx(arc.cut_length(), 5.0 * PI));
    }

    #[test]
    fn test_polyline_closing_segment() {
        let square = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let open = DrawingEntity::Polyline {
            points: square.clone(),
            closed: false,
        };
        let closed = DrawingEntity::Polyline {
            points: square,
            closed: true,
        };
        assert!(approx(open.cut_length(), 30.0));
        assert!(approx(closed.cut_length(), 40.0));
    }

    #[test]
    fn test_spline_is_scaled_control_polygon() {
        let spline = DrawingEntity::Spline {
            control_points: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]],
        };
        assert!(approx(spline.cut_length(), 24.0));
    }

    #[test]
    fn test_extents_union() {
        let drawing = Drawing::new(vec![
            DrawingEntity::Line {
                start: [0.0, 0.0],
                end: [50.0, 0.0],
            },
            DrawingEntity::Circle {
                center: [25.0, 20.0],
                radius: 5.0,
            },
        ]);
        assert_eq!(drawing.extents(), Some([50.0, 25.0]));
    }

    #[test]
    fn test_arc_extents_cover_crossed_quadrant() {
        let arc = Drawing::new(vec![DrawingEntity::Arc {
            center: [0.0, 0.0],
            radius: 10.0,
            start_angle: 0.0,
            end_angle: 180.0,
        }]);
        let [x, y] = arc.extents().unwrap();
        assert!(approx(x, 20.0));
        assert!(approx(y, 10.0));
    }

    #[test]
    fn test_empty_drawing_uses_placeholder() {
        let metrics = drawing_metrics(&Drawing::default(), 3.0);
        assert_eq!(metrics.bbox_mm, BoundingBox::new(100.0, 100.0, 3.0));
        assert_eq!(metrics.surface_area_cm2, 70.0);
        assert_eq!(metrics.volume_cm3, 21.0);
        assert_eq!(metrics.length_cut_mm, Some(0.0));
        assert_eq!(metrics.entity_count, Some(0));
        assert!(metrics.min_feature_mm.is_none());
    }

    #[test]
    fn test_load_dxf_entities() {
        use dxf::entities::{
            Arc, Circle, Entity, EntityType, Line, LwPolyline, ModelPoint,
            Polyline, Vertex,
        };
        use dxf::enums::AcadVersion;
        use dxf::{LwPolylineVertex, Point};

        let mut dxf = dxf::Drawing::new();
        // LWPOLYLINE needs R2000 or later to be written
        dxf.header.version = AcadVersion::R2000;

        dxf.add_entity(Entity::new(EntityType::Line(Line::new(
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.5, 0.0, 0.0),
        ))));

        let mut outline = LwPolyline::default();
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 50.0), (0.0, 50.0)] {
            outline.vertices.push(LwPolylineVertex {
                x,
                y,
                ..Default::default()
            });
        }
        outline.flags = 1;
        dxf.add_entity(Entity::new(EntityType::LwPolyline(outline)));

        let mut triangle = Polyline::default();
        for (x, y) in [(10.0, 10.0), (20.0, 10.0), (20.0, 20.0)] {
            triangle.add_vertex(&mut dxf, Vertex::new(Point::new(x, y, 0.0)));
        }
        triangle.flags = 1;
        dxf.add_entity(Entity::new(EntityType::Polyline(triangle)));

        dxf.add_entity(Entity::new(EntityType::Circle(Circle::new(
            Point::new(50.0, 25.0, 0.0),
            5.0,
        ))));
        dxf.add_entity(Entity::new(EntityType::Arc(Arc::new(
            Point::new(80.0, 25.0, 0.0),
            10.0,
            0.0,
            90.0,
        ))));
        // Not a cut path, must be skipped
        dxf.add_entity(Entity::new(EntityType::ModelPoint(ModelPoint::default())));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.dxf");
        dxf.save_file(path.to_str().unwrap()).unwrap();

        let drawing = Drawing::load_dxf(&path).unwrap();
        assert_eq!(drawing.entities.len(), 5);
        assert!(drawing
            .entities
            .iter()
            .any(|e| matches!(e, DrawingEntity::Polyline { points, closed: true } if points.len() == 4)));
        assert!(drawing
            .entities
            .iter()
            .any(|e| matches!(e, DrawingEntity::Polyline { points, closed: true } if points.len() == 3)));
        assert!(drawing.entities.iter().any(|e| matches!(
            e,
            DrawingEntity::Arc { start_angle, end_angle, .. } if *start_angle == 0.0 && *end_angle == 90.0
        )));

        // 0.5 + 300 + (20 + 10√2) + 10π + 5π
        let metrics = drawing_metrics(&drawing, 3.0);
        assert_eq!(metrics.length_cut_mm, Some(381.8));
        assert_eq!(metrics.entity_count, Some(5));
        assert_eq!(metrics.bbox_mm, BoundingBox::new(100.0, 50.0, 3.0));
        assert_eq!(metrics.min_feature_mm, Some(0.5));
    }

    #[test]
    fn test_min_feature_from_polyline_segment() {
        let drawing = Drawing::new(vec![
            DrawingEntity::Polyline {
                points: vec![[0.0, 0.0], [40.0, 0.0], [40.0, 0.4]],
                closed: false,
            },
            DrawingEntity::Circle {
                center: [10.0, 10.0],
                radius: 3.0,
            },
        ]);
        let metrics = drawing_metrics(&drawing, 2.0);
        assert_eq!(metrics.min_feature_mm, Some(0.4));
        assert_eq!(metrics.bbox_mm.z, 2.0);
    }
}
