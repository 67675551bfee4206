/// Axis-aligned bounding box in 3-D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Smallest box containing every finite point yielded by `points`.
    ///
    /// Points with a NaN component are skipped. Returns `None` when no
    /// point survives.
    pub fn from_points<I>(points: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = [f64; 3]>,
    {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut any = false;

        for p in points {
            if p.iter().any(|v| v.is_nan()) {
                continue;
            }
            any = true;
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        any.then_some(BoundingBox { min, max })
    }

    /// Euclidean distance from `p` to the nearest point of the box
    /// (zero inside). `z_scale` stretches the box vertically first, which
    /// is how vertical exaggeration enters LOD decisions.
    pub fn distance_to(&self, p: [f64; 3], z_scale: f64) -> f64 {
        let mut sum = 0.0;
        for axis in 0..3 {
            let (lo, hi) = if axis == 2 {
                (self.min[2] * z_scale, self.max[2] * z_scale)
            } else {
                (self.min[axis], self.max[axis])
            };
            let d = if p[axis] < lo {
                lo - p[axis]
            } else if p[axis] > hi {
                p[axis] - hi
            } else {
                0.0
            };
            sum += d * d;
        }
        sum.sqrt()
    }
}
