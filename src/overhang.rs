//! Overhang area for layer-based processes.

use nalgebra::Vector3;

use crate::mesh::TriangleMesh;
use crate::metrics::MM2_PER_CM2;

/// Faces tilted further than this from the build axis need support
pub const OVERHANG_ANGLE_DEG: f64 = 45.0;

/// Sum of face areas whose normal is more than [`OVERHANG_ANGLE_DEG`]
/// away from +Z, in cm².
pub fn overhang_area_cm2(mesh: &TriangleMesh) -> f64 {
    let build_axis = Vector3::z();
    let limit = OVERHANG_ANGLE_DEG.to_radians();

    let area_mm2: f64 = mesh
        .triangles()
        .filter_map(|tri| {
            let normal = tri.normal()?;
            let angle = normal.dot(&build_axis).clamp(-1.0, 1.0).acos();
            (angle > limit).then(|| tri.area())
        })
        .sum();

    area_mm2 / MM2_PER_CM2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::box_triangles;

    #[test]
    fn test_box_overhang_excludes_only_top() {
        // Everything but the +Z face is more than 45 degrees from the build axis
        let mesh = TriangleMesh::from_triangles(&box_triangles(10.0, 10.0, 10.0));
        assert!((overhang_area_cm2(&mesh) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_shallow_slope_is_not_overhang() {
        // Normal tilted ~26.6 degrees from +Z
        let mesh = TriangleMesh::from_triangles(&[[
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 5.0],
            [0.0, 10.0, 0.0],
        ]]);
        assert_eq!(overhang_area_cm2(&mesh), 0.0);
    }

    #[test]
    fn test_downward_face_is_overhang() {
        let mesh = TriangleMesh::from_triangles(&[[
            [0.0, 0.0, 0.0],
            [0.0, 10.0, 0.0],
            [10.0, 0.0, 0.0],
        ]]);
        assert!((overhang_area_cm2(&mesh) - 0.5).abs() < 1e-9);
    }
}
