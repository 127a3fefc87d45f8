//! Ray queries against a triangle soup.
//!
//! A median-split BVH over triangle bounds with Möller–Trumbore hit tests.
//! Only the nearest hit distance is ever needed by the estimators.

use nalgebra::{Point3, Vector3};

const EPSILON: f64 = 1e-9;

/// A triangle in world space.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized normal; length is twice the area.
    pub fn cross(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    pub fn area(&self) -> f64 {
        self.cross().norm() * 0.5
    }

    /// Unit normal following the winding, `None` for degenerate faces.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.cross();
        let len = n.norm();
        (len > EPSILON).then(|| n / len)
    }

    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_triangle(tri: &Triangle) -> Self {
        Self {
            min: Point3::new(
                tri.v0.x.min(tri.v1.x).min(tri.v2.x),
                tri.v0.y.min(tri.v1.y).min(tri.v2.y),
                tri.v0.z.min(tri.v1.z).min(tri.v2.z),
            ),
            max: Point3::new(
                tri.v0.x.max(tri.v1.x).max(tri.v2.x),
                tri.v0.y.max(tri.v1.y).max(tri.v2.y),
                tri.v0.z.max(tri.v1.z).max(tri.v2.z),
            ),
        }
    }

    fn union(&self, other: &Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    fn expand(&self, pad: f64) -> Self {
        let pad = Vector3::new(pad, pad, pad);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Slab test; returns entry distance when the ray hits the box.
    fn ray_entry(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<f64> {
        let t1 = (self.min.x - origin.x) * dir_inv.x;
        let t2 = (self.max.x - origin.x) * dir_inv.x;
        let t3 = (self.min.y - origin.y) * dir_inv.y;
        let t4 = (self.max.y - origin.y) * dir_inv.y;
        let t5 = (self.min.z - origin.z) * dir_inv.z;
        let t6 = (self.max.z - origin.z) * dir_inv.z;

        let t_min = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let t_max = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        (t_max >= t_min && t_max >= 0.0).then(|| t_min.max(0.0))
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        face: usize,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn build(triangles: &[Triangle], indices: &mut [usize]) -> Option<Self> {
        match indices.len() {
            0 => return None,
            1 => {
                return Some(Self::Leaf {
                    aabb: Aabb::from_triangle(&triangles[indices[0]]).expand(EPSILON),
                    face: indices[0],
                })
            }
            _ => {}
        }

        let aabb = indices
            .iter()
            .map(|&i| Aabb::from_triangle(&triangles[i]))
            .reduce(|a, b| a.union(&b))?
            .expand(EPSILON);

        let extent = aabb.max - aabb.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        indices.sort_by(|&a, &b| {
            let ca = triangles[a].centroid()[axis];
            let cb = triangles[b].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mid = indices.len() / 2;
        let (left, right) = indices.split_at_mut(mid);
        match (Self::build(triangles, left), Self::build(triangles, right)) {
            (Some(l), Some(r)) => Some(Self::Internal {
                aabb,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (Some(n), None) | (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            Self::Leaf { aabb, .. } | Self::Internal { aabb, .. } => aabb,
        }
    }
}

/// Acceleration structure for nearest-hit queries.
#[derive(Debug)]
pub struct RayCaster {
    triangles: Vec<Triangle>,
    root: Option<BvhNode>,
}

impl RayCaster {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let root = BvhNode::build(&triangles, &mut indices);
        Self { triangles, root }
    }

    /// Distance to the nearest surface hit along `direction` (unit length),
    /// ignoring `skip_face` so a ray leaving a surface does not hit its own face.
    pub fn nearest_hit(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        skip_face: Option<usize>,
    ) -> Option<f64> {
        let root = self.root.as_ref()?;
        let inv = |d: f64| if d.abs() > EPSILON { 1.0 / d } else { f64::MAX };
        let dir_inv = Vector3::new(inv(direction.x), inv(direction.y), inv(direction.z));
        self.trace(root, origin, direction, &dir_inv, f64::MAX, skip_face)
    }

    fn trace(
        &self,
        node: &BvhNode,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        dir_inv: &Vector3<f64>,
        max_dist: f64,
        skip_face: Option<usize>,
    ) -> Option<f64> {
        match node.aabb().ray_entry(origin, dir_inv) {
            Some(t_near) if t_near <= max_dist => {}
            _ => return None,
        }

        match node {
            BvhNode::Leaf { face, .. } => {
                if skip_face == Some(*face) {
                    return None;
                }
                ray_triangle_intersect(origin, direction, &self.triangles[*face])
                    .filter(|&t| t <= max_dist)
            }
            BvhNode::Internal { left, right, .. } => {
                let hit_left = self.trace(left, origin, direction, dir_inv, max_dist, skip_face);
                let bound = hit_left.unwrap_or(max_dist);
                let hit_right = self.trace(right, origin, direction, dir_inv, bound, skip_face);
                match (hit_left, hit_right) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }
}

/// Möller–Trumbore; hits closer than epsilon count as self-intersection.
#[allow(clippy::many_single_char_names)]
fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
) -> Option<f64> {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > 1e-6).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_at_z(z: f64) -> Vec<Triangle> {
        vec![
            Triangle::new(
                Point3::new(-5.0, -5.0, z),
                Point3::new(5.0, -5.0, z),
                Point3::new(5.0, 5.0, z),
            ),
            Triangle::new(
                Point3::new(-5.0, -5.0, z),
                Point3::new(5.0, 5.0, z),
                Point3::new(-5.0, 5.0, z),
            ),
        ]
    }

    #[test]
    fn test_nearest_of_two_planes() {
        let mut tris = quad_at_z(2.0);
        tris.extend(quad_at_z(7.0));
        let caster = RayCaster::new(tris);

        let hit = caster
            .nearest_hit(&Point3::new(0.5, 0.25, 0.0), &Vector3::z(), None)
            .unwrap();
        assert!((hit - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_miss_returns_none() {
        let caster = RayCaster::new(quad_at_z(2.0));
        assert!(caster
            .nearest_hit(&Point3::new(0.0, 0.0, 0.0), &(-Vector3::z()), None)
            .is_none());
        assert!(caster
            .nearest_hit(&Point3::new(50.0, 0.0, 0.0), &Vector3::z(), None)
            .is_none());
    }

    #[test]
    fn test_skip_face() {
        let caster = RayCaster::new(quad_at_z(2.0));
        // Ray through face 0 interior only
        let origin = Point3::new(3.0, -2.0, 0.0);
        assert!(caster.nearest_hit(&origin, &Vector3::z(), None).is_some());
        assert!(caster.nearest_hit(&origin, &Vector3::z(), Some(0)).is_none());
    }

    #[test]
    fn test_empty_caster() {
        let caster = RayCaster::new(Vec::new());
        assert!(caster
            .nearest_hit(&Point3::origin(), &Vector3::x(), None)
            .is_none());
    }

    #[test]
    fn test_triangle_area_and_normal() {
        let tri = quad_at_z(0.0)[0];
        assert!((tri.area() - 50.0).abs() < 1e-9);
        assert!((tri.normal().unwrap() - Vector3::z()).norm() < 1e-12);
    }
}
