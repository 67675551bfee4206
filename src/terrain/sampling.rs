use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{DVec2, DVec3};
use tracing::debug;

use super::Terrain;
use super::query::TileCursor;
use crate::geometry::{PlaneEquation, Polygon, ReferenceSurface, slope_degrees, triangle_area};

/// Shared flag polled by long-running region scans.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cut/fill volume between the terrain and a reference, projected units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Volume {
    /// Terrain above the reference.
    pub above: f64,
    /// Terrain below the reference.
    pub below: f64,
}

/// Terrain-minus-plane differences on a fixed-capacity grid. Row 0 is the
/// southern edge of the polygon's bounding rectangle.
#[derive(Debug, Clone)]
pub struct DifferenceGrid {
    pub rows: usize,
    pub columns: usize,
    /// Local-frame centre of cell (0, 0).
    pub origin: DVec2,
    pub sample_size: f64,
    values: Vec<f64>,
    /// Extremes over the finite cells; NaN if there are none.
    pub min: f64,
    pub max: f64,
}

impl DifferenceGrid {
    /// Difference at `(row, column)`; NaN outside the polygon, where data is
    /// missing, or past the capacity.
    pub fn get(&self, row: usize, column: usize) -> f64 {
        if row >= self.rows || column >= self.columns {
            return f64::NAN;
        }
        self.values[row * self.columns + column]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Cell-centred sample lattice over a polygon's bounding rectangle.
struct SampleGrid {
    lower: DVec2,
    step: DVec2,
    rows: usize,
    columns: usize,
}

impl SampleGrid {
    fn over(polygon: &Polygon, step: DVec2) -> Self {
        let (lower, upper) = polygon.bounds();
        let extent = (upper - lower).truncate();
        let cells = |len: f64, step: f64| {
            if step > 0.0 && step.is_finite() {
                (len / step).floor() as usize
            } else {
                0
            }
        };
        Self {
            lower: lower.truncate(),
            step,
            rows: cells(extent.y, step.y),
            columns: cells(extent.x, step.x),
        }
    }

    fn point(&self, row: usize, column: usize) -> DVec2 {
        self.lower + self.step * DVec2::new(column as f64 + 0.5, row as f64 + 0.5)
    }
}

impl Terrain {
    /// Mean full-resolution elevation of the samples inside `polygon`
    /// (local frame). NaN when no sample has data; `None` when cancelled.
    pub fn mean_elevation(&self, polygon: &Polygon, cancel: &CancelToken) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut cursor = TileCursor::default();
        self.scan(polygon, self.full_resolution_step(), cancel, |_, _, p| {
            let elevation = self.elevation_near(&mut cursor, p.x, p.y);
            if !elevation.is_nan() {
                sum += elevation;
                count += 1;
            }
        })?;
        Some(if count == 0 { f64::NAN } else { sum / count as f64 })
    }

    /// Slope in degrees from vertical of the averaged surface normal.
    pub fn mean_slope(&self, polygon: &Polygon, cancel: &CancelToken) -> Option<f64> {
        let mut sum = DVec3::ZERO;
        let mut count = 0usize;
        let mut cursor = TileCursor::default();
        self.scan(polygon, self.full_resolution_step(), cancel, |_, _, p| {
            if let Some(normal) = self.normal_near(&mut cursor, p.x, p.y) {
                sum += normal;
                count += 1;
            }
        })?;
        Some(if count == 0 { f64::NAN } else { slope_degrees(sum) })
    }

    /// Volume between the terrain and `surface` (local frame). Each sample
    /// casts a ray straight down from above both the terrain and the
    /// polygon; samples whose ray misses the surface are skipped.
    pub fn volume_against_surface(
        &self,
        polygon: &Polygon,
        surface: &dyn ReferenceSurface,
        cancel: &CancelToken,
    ) -> Option<Volume> {
        let scale = self.frame.pixel_scale;
        let (_, upper) = polygon.bounds();
        let top = upper.z.max(self.bounds().max[2]) + 1.0;
        self.accumulate_volume(polygon, cancel, |p, elevation| {
            let t = surface.cast_ray(p.extend(top), DVec3::NEG_Z)?;
            Some((self.frame.height_to_local(elevation) - (top - t)) / scale)
        })
    }

    /// Volume between the terrain and the horizontal level `elevation`.
    pub fn volume_against_elevation(&self, polygon: &Polygon, elevation: f64, cancel: &CancelToken) -> Option<Volume> {
        self.accumulate_volume(polygon, cancel, |_, sample| Some(sample - elevation))
    }

    /// Terrain height minus `plane` height (local frame plane, projected
    /// units result) on a `sample_size` lattice, written into a
    /// `rows x columns` grid.
    pub fn difference_grid(
        &self,
        polygon: &Polygon,
        plane: &PlaneEquation,
        sample_size: f64,
        rows: usize,
        columns: usize,
        cancel: &CancelToken,
    ) -> Option<DifferenceGrid> {
        let step = DVec2::splat(sample_size);
        let mut values = vec![f64::NAN; rows * columns];
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut cursor = TileCursor::default();

        self.scan(polygon, step, cancel, |row, column, p| {
            if row >= rows || column >= columns {
                return;
            }
            let elevation = self.elevation_near(&mut cursor, p.x, p.y);
            let diff = (self.frame.height_to_local(elevation) - plane.z_at(p.x, p.y)) / self.frame.pixel_scale;
            values[row * columns + column] = diff;
            if diff.is_finite() {
                min = min.min(diff);
                max = max.max(diff);
            }
        })?;

        let grid = SampleGrid::over(polygon, step);
        let (min, max) = if min <= max { (min, max) } else { (f64::NAN, f64::NAN) };
        Some(DifferenceGrid {
            rows,
            columns,
            origin: grid.point(0, 0),
            sample_size,
            values,
            min,
            max,
        })
    }

    /// Surface area inside `polygon`, projected units. Each sample
    /// contributes a fan of eight triangles over its cell; triangles touching
    /// missing data contribute nothing.
    pub fn surface_area(&self, polygon: &Polygon, cancel: &CancelToken) -> Option<f64> {
        let step = self.full_resolution_step();
        let half = step / 2.0;
        let scale = self.frame.pixel_scale;
        let ring = [
            DVec2::new(-half.x, half.y),
            DVec2::new(0.0, half.y),
            DVec2::new(half.x, half.y),
            DVec2::new(half.x, 0.0),
            DVec2::new(half.x, -half.y),
            DVec2::new(0.0, -half.y),
            DVec2::new(-half.x, -half.y),
            DVec2::new(-half.x, 0.0),
        ];

        let mut area = 0.0;
        let mut cursor = TileCursor::default();
        self.scan(polygon, step, cancel, |_, _, p| {
            let mut vertex = |offset: DVec2| {
                let q = p + offset;
                (q / scale).extend(self.elevation_near(&mut cursor, q.x, q.y))
            };
            let center = vertex(DVec2::ZERO);
            let ring = ring.map(&mut vertex);
            for i in 0..ring.len() {
                let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
                if center.z.is_nan() || a.z.is_nan() || b.z.is_nan() {
                    continue;
                }
                area += triangle_area(center, a, b);
            }
        })?;
        Some(area)
    }

    fn full_resolution_step(&self) -> DVec2 {
        DVec2::new(self.pixel_width(), self.pixel_length())
    }

    /// Above/below accounting shared by the volume analyses. `difference`
    /// maps a sample point and its elevation to terrain-minus-reference in
    /// projected units, or `None` to skip the sample.
    fn accumulate_volume(
        &self,
        polygon: &Polygon,
        cancel: &CancelToken,
        difference: impl Fn(DVec2, f64) -> Option<f64>,
    ) -> Option<Volume> {
        let step = self.full_resolution_step();
        let mut volume = Volume::default();
        let mut cursor = TileCursor::default();
        self.scan(polygon, step, cancel, |_, _, p| {
            let elevation = self.elevation_near(&mut cursor, p.x, p.y);
            if elevation.is_nan() {
                return;
            }
            match difference(p, elevation) {
                Some(d) if d > 0.0 => volume.above += d,
                Some(d) => volume.below -= d,
                None => {}
            }
        })?;
        let scale = self.frame.pixel_scale;
        let cell_area = (step.x / scale) * (step.y / scale);
        volume.above *= cell_area;
        volume.below *= cell_area;
        Some(volume)
    }

    /// Visit every lattice sample inside `polygon` as `(row, column, point)`.
    /// Returns `None` as soon as `cancel` is set.
    fn scan(
        &self,
        polygon: &Polygon,
        step: DVec2,
        cancel: &CancelToken,
        mut visit: impl FnMut(usize, usize, DVec2),
    ) -> Option<()> {
        let grid = SampleGrid::over(polygon, step);
        for row in 0..grid.rows {
            for column in 0..grid.columns {
                if cancel.is_cancelled() {
                    debug!(row, column, "Region scan cancelled");
                    return None;
                }
                let p = grid.point(row, column);
                if polygon.contains(p) {
                    visit(row, column, p);
                }
            }
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TriangleSurface;
    use crate::terrain::tests::terrain_from;
    use approx::assert_relative_eq;

    fn square(half: f64) -> Polygon {
        Polygon::rectangle(DVec2::splat(-half), DVec2::splat(half), 0.0).unwrap()
    }

    #[test]
    fn mean_elevation_skips_missing() {
        let missing = [(0, 0), (3, 1), (2, 3)];
        let terrain = terrain_from(4, 4, |c, r| {
            if missing.contains(&(c, r)) { -9999.0 } else { (c + 4 * r) as f32 }
        });
        let expected: f64 = (0..16)
            .filter(|i| !missing.contains(&(i % 4, i / 4)))
            .map(|i| i as f64)
            .sum::<f64>()
            / 13.0;
        let mean = terrain.mean_elevation(&square(2.0), &CancelToken::new()).unwrap();
        assert_relative_eq!(mean, expected, epsilon = 1e-6);
    }

    #[test]
    fn mean_elevation_without_data_is_nan() {
        let terrain = terrain_from(4, 4, |c, _| if c < 2 { -9999.0 } else { 1.0 });
        let west = Polygon::rectangle(DVec2::new(-2.0, -2.0), DVec2::new(0.0, 2.0), 0.0).unwrap();
        assert!(terrain.mean_elevation(&west, &CancelToken::new()).unwrap().is_nan());
    }

    #[test]
    fn volume_against_constant() {
        let terrain = terrain_from(16, 16, |_, _| 5.0);
        let volume = terrain
            .volume_against_elevation(&square(5.0), 3.0, &CancelToken::new())
            .unwrap();
        assert_relative_eq!(volume.above, 200.0, epsilon = 1e-9);
        assert_eq!(volume.below, 0.0);
    }

    #[test]
    fn volume_against_plane_and_mesh() {
        let terrain = terrain_from(16, 16, |_, _| 5.0);
        // Local z of elevation 7 is 2 above the flat terrain; the polygon is
        // drawn on the plane.
        let plane = PlaneEquation::horizontal(2.0);
        let raised = Polygon::rectangle(DVec2::splat(-5.0), DVec2::splat(5.0), 2.0).unwrap();
        let volume = terrain
            .volume_against_surface(&raised, &plane, &CancelToken::new())
            .unwrap();
        assert_eq!(volume.above, 0.0);
        assert_relative_eq!(volume.below, 200.0, epsilon = 1e-9);

        let mesh = TriangleSurface::new(vec![
            [DVec3::new(-8.0, -8.0, -1.0), DVec3::new(8.0, -8.0, -1.0), DVec3::new(8.0, 8.0, -1.0)],
            [DVec3::new(-8.0, -8.0, -1.0), DVec3::new(8.0, 8.0, -1.0), DVec3::new(-8.0, 8.0, -1.0)],
        ]);
        let volume = terrain
            .volume_against_surface(&square(5.0), &mesh, &CancelToken::new())
            .unwrap();
        assert_relative_eq!(volume.above, 100.0, epsilon = 1e-9);
        assert_eq!(volume.below, 0.0);
    }

    #[test]
    fn slope_and_area_of_ramp() {
        // z = x: 45 degrees, area sqrt(2) per unit cell.
        let terrain = terrain_from(8, 8, |c, _| c as f32);
        let poly = square(2.0);
        let slope = terrain.mean_slope(&poly, &CancelToken::new()).unwrap();
        assert_relative_eq!(slope, 45.0, epsilon = 1e-6);
        let area = terrain.surface_area(&poly, &CancelToken::new()).unwrap();
        assert_relative_eq!(area, 16.0 * 2f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn area_of_flat_region() {
        let terrain = terrain_from(8, 8, |_, _| 1.0);
        let area = terrain.surface_area(&square(3.0), &CancelToken::new()).unwrap();
        assert_relative_eq!(area, 36.0, epsilon = 1e-9);
    }

    #[test]
    fn difference_grid_capacity_and_extremes() {
        let terrain = terrain_from(8, 8, |c, _| c as f32);
        let plane = PlaneEquation::horizontal(0.0);
        let grid = terrain
            .difference_grid(&square(2.0), &plane, 1.0, 3, 5, &CancelToken::new())
            .unwrap();
        assert_eq!(grid.values().len(), 15);
        assert_eq!(grid.origin, DVec2::new(-1.5, -1.5));
        // Column j samples x = -1.5 + j, where the ramp is x + 3.5.
        assert_relative_eq!(grid.get(0, 0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(grid.get(2, 3), 5.0, epsilon = 1e-6);
        // Column 4 is past the 4-sample polygon, row 3 past the capacity.
        assert!(grid.get(0, 4).is_nan());
        assert!(grid.get(3, 0).is_nan());
        assert_relative_eq!(grid.min, 2.0, epsilon = 1e-6);
        assert_relative_eq!(grid.max, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn difference_grid_without_data() {
        let terrain = terrain_from(4, 4, |_, _| 1.0);
        let grid = terrain
            .difference_grid(&square(2.0), &PlaneEquation::horizontal(0.0), 0.0, 2, 2, &CancelToken::new())
            .unwrap();
        assert!(grid.values().iter().all(|v| v.is_nan()));
        assert!(grid.min.is_nan() && grid.max.is_nan());
    }

    #[test]
    fn cancelled_scan_returns_none() {
        let terrain = terrain_from(8, 8, |_, _| 1.0);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(cancel.is_cancelled());
        let poly = square(3.0);
        assert!(terrain.mean_elevation(&poly, &cancel).is_none());
        assert!(terrain.mean_slope(&poly, &cancel).is_none());
        assert!(terrain.surface_area(&poly, &cancel).is_none());
        assert!(terrain.volume_against_elevation(&poly, 0.0, &cancel).is_none());
        assert!(terrain
            .difference_grid(&poly, &PlaneEquation::horizontal(0.0), 1.0, 4, 4, &cancel)
            .is_none());
    }
}
