//! Triangulated Mesh Provider
//!
//! Loads STL files through `stl_io`, welds coincident vertices and exposes
//! the primitives the estimators need: extents, volume, area, watertightness,
//! surface sampling and ray casting.

use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::debug;

use crate::extract::ProviderError;
use crate::metrics::{BoundingBox, GeometryMetrics, round_to, MM2_PER_CM2, MM3_PER_CM3};
use crate::overhang::overhang_area_cm2;
use crate::raycast::{RayCaster, Triangle};
use crate::request::ProcessType;
use crate::thickness::estimate_wall_thickness;

/// Weld precision: coordinates are compared at 1e-4 mm.
const WELD_PRECISION: f64 = 10_000.0;

/// Interior edges whose faces bend more than this are sharp.
const SHARP_EDGE_ANGLE_DEG: f64 = 60.0;

/// A point on the surface with the outward normal of its face.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSample {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
    pub face: usize,
}

#[derive(Debug, Clone)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Build from a triangle soup, welding shared corners.
    pub fn from_triangles(triangles: &[[[f64; 3]; 3]]) -> Self {
        let mut vertices = Vec::new();
        let mut lookup: HashMap<[i64; 3], usize> = HashMap::new();
        let mut faces = Vec::with_capacity(triangles.len());

        for tri in triangles {
            let mut face = [0usize; 3];
            for (slot, corner) in face.iter_mut().zip(tri.iter()) {
                let key = [
                    (corner[0] * WELD_PRECISION).round() as i64,
                    (corner[1] * WELD_PRECISION).round() as i64,
                    (corner[2] * WELD_PRECISION).round() as i64,
                ];
                *slot = *lookup.entry(key).or_insert_with(|| {
                    vertices.push(Point3::new(corner[0], corner[1], corner[2]));
                    vertices.len() - 1
                });
            }
            faces.push(face);
        }

        Self { vertices, faces }
    }

    pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<Self, ProviderError> {
        let stl = stl_io::read_stl(reader).map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(v) = stl
            .vertices
            .iter()
            .find(|v| !(v[0].is_finite() && v[1].is_finite() && v[2].is_finite()))
        {
            return Err(ProviderError::Parse(format!(
                "non-finite vertex ({}, {}, {})",
                v[0], v[1], v[2]
            )));
        }

        let triangles: Vec<[[f64; 3]; 3]> = stl
            .faces
            .iter()
            .map(|face| {
                face.vertices.map(|i| {
                    let v = stl.vertices[i];
                    [f64::from(v[0]), f64::from(v[1]), f64::from(v[2])]
                })
            })
            .collect();

        let mesh = Self::from_triangles(&triangles);
        if mesh.faces.is_empty() {
            return Err(ProviderError::EmptyGeometry);
        }
        debug!(
            faces = mesh.faces.len(),
            vertices = mesh.vertices.len(),
            "Loaded STL mesh"
        );
        Ok(mesh)
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let file = File::open(path)?;
        Self::read_stl(&mut BufReader::new(file))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn triangle(&self, face: usize) -> Triangle {
        let [a, b, c] = self.faces[face];
        Triangle::new(self.vertices[a], self.vertices[b], self.vertices[c])
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.faces.len()).map(move |i| self.triangle(i))
    }

    /// Axis-aligned extents (mm)
    pub fn bounding_extents(&self) -> [f64; 3] {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        if self.vertices.is_empty() {
            return [0.0; 3];
        }
        [max[0] - min[0], max[1] - min[1], max[2] - min[2]]
    }

    /// Enclosed volume via signed tetrahedra (mm³)
    pub fn volume(&self) -> f64 {
        self.triangles()
            .map(|t| t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords)) / 6.0)
            .sum::<f64>()
            .abs()
    }

    /// Total surface area (mm²)
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|t| t.area()).sum()
    }

    /// Every directed edge is matched by exactly one opposite edge.
    pub fn is_watertight(&self) -> bool {
        if self.faces.is_empty() {
            return false;
        }
        let mut directed: HashMap<(usize, usize), u32> = HashMap::new();
        for face in &self.faces {
            for k in 0..3 {
                *directed.entry((face[k], face[(k + 1) % 3])).or_insert(0) += 1;
            }
        }
        directed
            .iter()
            .all(|(&(a, b), &count)| count == 1 && directed.get(&(b, a)) == Some(&1))
    }

    /// Area-weighted random points on the surface.
    pub fn sample_surface_points<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<SurfaceSample> {
        let mut cumulative = Vec::with_capacity(self.faces.len());
        let mut total = 0.0;
        for tri in self.triangles() {
            total += tri.area();
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Vec::new();
        }

        (0..count)
            .filter_map(|_| {
                let pick = rng.random::<f64>() * total;
                let face = cumulative
                    .partition_point(|&c| c < pick)
                    .min(self.faces.len() - 1);
                let tri = self.triangle(face);
                let normal = tri.normal()?;

                let (mut u, mut v) = (rng.random::<f64>(), rng.random::<f64>());
                if u + v > 1.0 {
                    u = 1.0 - u;
                    v = 1.0 - v;
                }
                let point = tri.v0 + (tri.v1 - tri.v0) * u + (tri.v2 - tri.v0) * v;
                Some(SurfaceSample { point, normal, face })
            })
            .collect()
    }

    pub fn ray_caster(&self) -> RayCaster {
        RayCaster::new(self.triangles().collect())
    }

    /// Concave interior edges sharper than [`SHARP_EDGE_ANGLE_DEG`].
    pub fn sharp_concave_edge_count(&self) -> u32 {
        let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (i, face) in self.faces.iter().enumerate() {
            for k in 0..3 {
                let (a, b) = (face[k], face[(k + 1) % 3]);
                edge_faces.entry((a.min(b), a.max(b))).or_default().push(i);
            }
        }

        let cos_limit = SHARP_EDGE_ANGLE_DEG.to_radians().cos();
        let mut count = 0;
        for ((a, b), faces) in &edge_faces {
            let [f1, f2] = faces.as_slice() else { continue };
            let (Some(n1), Some(n2)) = (self.triangle(*f1).normal(), self.triangle(*f2).normal())
            else {
                continue;
            };
            if n1.dot(&n2) >= cos_limit {
                continue;
            }
            // Opposite corner of the second face lies in front of the first: concave
            let Some(&opposite) = self.faces[*f2].iter().find(|&&v| v != *a && v != *b) else {
                continue;
            };
            if (self.vertices[opposite] - self.vertices[*a]).dot(&n1) > 1e-9 {
                count += 1;
            }
        }
        count
    }
}

/// Reduce a mesh to canonical metrics.
pub fn mesh_metrics(
    mesh: &TriangleMesh,
    process: ProcessType,
    samples: usize,
    seed: u64,
) -> GeometryMetrics {
    let mut metrics = GeometryMetrics::new(
        mesh.volume() / MM3_PER_CM3,
        mesh.surface_area() / MM2_PER_CM2,
        BoundingBox::from_extents(mesh.bounding_extents()),
    );

    if let Some(thickness) = estimate_wall_thickness(mesh, samples, seed) {
        metrics.wall_thickness_min = Some(round_to(thickness.min, 2));
        metrics.wall_thickness_avg = Some(round_to(thickness.avg, 2));
    }

    if process.is_additive() {
        metrics.overhang_area = Some(round_to(overhang_area_cm2(mesh), 2));
    }

    if process == ProcessType::Cnc3Axis {
        metrics.sharp_edge_count = Some(mesh.sharp_concave_edge_count());
    }

    metrics.triangle_count = Some(u32::try_from(mesh.face_count()).unwrap_or(u32::MAX));
    metrics.is_watertight = Some(mesh.is_watertight());
    metrics
}
