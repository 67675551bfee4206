//! Planar and 3D helpers shared by the region analyses.

use glam::{DVec2, DVec3};

use crate::error::{Result, TerrainError};

/// Closed polygon in the local frame. Containment uses the xy components
/// only; z carries the vertex heights.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<DVec3>,
}

impl Polygon {
    pub fn new(vertices: Vec<DVec3>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(TerrainError::Config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(TerrainError::Config("polygon vertices must be finite".into()));
        }
        Ok(Self { vertices })
    }

    /// Axis-aligned rectangle with corners at height `z`.
    pub fn rectangle(min: DVec2, max: DVec2, z: f64) -> Result<Self> {
        Self::new(vec![
            DVec3::new(min.x, min.y, z),
            DVec3::new(max.x, min.y, z),
            DVec3::new(max.x, max.y, z),
            DVec3::new(min.x, max.y, z),
        ])
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, p: DVec2) -> bool {
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for (i, vi) in self.vertices.iter().enumerate() {
            let vj = self.vertices[j];
            if (vi.y > p.y) != (vj.y > p.y)
                && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// `(lower, upper)` corners of the bounding box.
    pub fn bounds(&self) -> (DVec3, DVec3) {
        self.vertices.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        )
    }
}

/// Something a vertical ray can hit: the reference for volume analyses.
pub trait ReferenceSurface {
    /// Distance along `direction` (unit length) from `origin` to the first
    /// hit, or `None` if the ray misses.
    fn cast_ray(&self, origin: DVec3, direction: DVec3) -> Option<f64>;
}

/// Plane `a*x + b*y + c*z + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneEquation {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl PlaneEquation {
    /// Plane through three points; `None` if they are collinear.
    pub fn from_points(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<Self> {
        let n = (p1 - p0).cross(p2 - p0);
        if n.length_squared() < f64::EPSILON {
            return None;
        }
        Some(Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(p0),
        })
    }

    /// Horizontal plane at height `z`.
    pub fn horizontal(z: f64) -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            c: 1.0,
            d: -z,
        }
    }

    pub fn normal(&self) -> DVec3 {
        DVec3::new(self.a, self.b, self.c)
    }

    /// Height of the plane above `(x, y)`; NaN for a vertical plane.
    pub fn z_at(&self, x: f64, y: f64) -> f64 {
        if self.c == 0.0 {
            return f64::NAN;
        }
        -(self.a * x + self.b * y + self.d) / self.c
    }
}

impl ReferenceSurface for PlaneEquation {
    fn cast_ray(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
        let n = self.normal();
        let denom = n.dot(direction);
        if denom.abs() < f64::EPSILON {
            return None;
        }
        let t = -(n.dot(origin) + self.d) / denom;
        (t >= 0.0).then_some(t)
    }
}

/// Triangulated reference surface (e.g. a digitized reference mesh).
#[derive(Debug, Clone, Default)]
pub struct TriangleSurface {
    pub triangles: Vec<[DVec3; 3]>,
}

impl TriangleSurface {
    pub fn new(triangles: Vec<[DVec3; 3]>) -> Self {
        Self { triangles }
    }
}

impl ReferenceSurface for TriangleSurface {
    fn cast_ray(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
        self.triangles
            .iter()
            .filter_map(|tri| ray_triangle(origin, direction, tri))
            .min_by(f64::total_cmp)
    }
}

/// Möller–Trumbore intersection; edges count as hits.
fn ray_triangle(origin: DVec3, direction: DVec3, [v0, v1, v2]: &[DVec3; 3]) -> Option<f64> {
    let e1 = *v1 - *v0;
    let e2 = *v2 - *v0;
    let p = direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - *v0;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = direction.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t >= 0.0).then_some(t)
}

/// Area of a 3D triangle.
pub fn triangle_area(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    0.5 * (b - a).cross(c - a).length()
}

/// Angle between `normal` and vertical, in degrees.
pub fn slope_degrees(normal: DVec3) -> f64 {
    let len = normal.length();
    if len == 0.0 {
        return f64::NAN;
    }
    (normal.z / len).clamp(-1.0, 1.0).acos().to_degrees()
}
