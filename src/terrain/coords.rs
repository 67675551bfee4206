use glam::DVec3;

use super::Terrain;
use crate::error::{Result, TerrainError};
use crate::transform::ProjectionTransform;

/// Mapping between the local display frame and the projected frame.
///
/// Local: origin at the terrain centre, `z = (elevation - min) * scale`.
/// Projected: `xy = local.xy / scale`, `z = local.z / scale + min`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub pixel_scale: f64,
    pub min_elevation: f64,
}

impl LocalFrame {
    pub fn to_projected(&self, local: DVec3) -> DVec3 {
        DVec3::new(
            local.x / self.pixel_scale,
            local.y / self.pixel_scale,
            self.height_to_elevation(local.z),
        )
    }

    pub fn to_local(&self, projected: DVec3) -> DVec3 {
        DVec3::new(
            projected.x * self.pixel_scale,
            projected.y * self.pixel_scale,
            self.height_to_local(projected.z),
        )
    }

    /// Local z of an elevation in raster units.
    pub fn height_to_local(&self, elevation: f64) -> f64 {
        (elevation - self.min_elevation) * self.pixel_scale
    }

    pub fn height_to_elevation(&self, z: f64) -> f64 {
        z / self.pixel_scale + self.min_elevation
    }
}

impl Terrain {
    pub fn local_to_projected(&self, local: DVec3) -> DVec3 {
        self.frame.to_projected(local)
    }

    pub fn projected_to_local(&self, projected: DVec3) -> DVec3 {
        self.frame.to_local(projected)
    }

    /// Projected point to `(lon, lat, elevation)`.
    pub fn projected_to_geodetic(&self, projected: DVec3) -> Result<DVec3> {
        self.projection()?.projected_to_geodetic(projected)
    }

    pub fn geodetic_to_projected(&self, geodetic: DVec3) -> Result<DVec3> {
        self.projection()?.geodetic_to_projected(geodetic)
    }

    pub fn geodetic_to_local(&self, geodetic: DVec3) -> Result<DVec3> {
        Ok(self.projected_to_local(self.geodetic_to_projected(geodetic)?))
    }

    pub fn local_to_geodetic(&self, local: DVec3) -> Result<DVec3> {
        self.projected_to_geodetic(self.local_to_projected(local))
    }

    /// Longitude and latitude of the terrain centre with the surface
    /// elevation there (the minimum elevation where the centre has no data).
    pub fn center_geodetic(&self) -> Result<DVec3> {
        let center = self.projection()?.center_geodetic();
        let elevation = self.elevation(0.0, 0.0);
        let elevation = if elevation.is_nan() {
            self.info.min_elevation
        } else {
            elevation
        };
        Ok(DVec3::new(center.x, center.y, elevation))
    }

    /// Globe the terrain lies on, if it has a spatial reference.
    pub fn globe_name(&self) -> Option<&str> {
        self.projection.as_deref().map(|p| p.globe_name())
    }

    fn projection(&self) -> Result<&dyn ProjectionTransform> {
        self.projection
            .as_deref()
            .ok_or_else(|| TerrainError::Projection("terrain has no spatial reference".into()))
    }
}
