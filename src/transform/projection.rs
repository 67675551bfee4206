use glam::{DVec2, DVec3};
use proj::Proj;

use super::ProjectionTransform;
use crate::error::{Result, TerrainError};

/// PROJ-backed transform between a terrain-centred projected frame and a
/// geographic CRS.
pub struct ProjTransform {
    globe: String,
    to_geodetic: Proj,
    to_projected: Proj,
    /// Terrain centre in the source CRS.
    origin: DVec2,
    center: DVec3,
}

impl ProjTransform {
    pub fn new(globe: &str, crs: &str, geographic_crs: &str, origin: [f64; 2]) -> Result<Self> {
        let to_geodetic = Proj::new_known_crs(crs, geographic_crs, None).map_err(|e| {
            TerrainError::Projection(format!(
                "Failed to create projection from {crs} to {geographic_crs}: {e}"
            ))
        })?;
        let to_projected = Proj::new_known_crs(geographic_crs, crs, None).map_err(|e| {
            TerrainError::Projection(format!(
                "Failed to create projection from {geographic_crs} to {crs}: {e}"
            ))
        })?;

        let (lon, lat) = to_geodetic
            .convert((origin[0], origin[1]))
            .map_err(|e| TerrainError::Projection(format!("Projection failed: {e}")))?;

        Ok(Self {
            globe: globe.to_string(),
            to_geodetic,
            to_projected,
            origin: DVec2::from(origin),
            center: DVec3::new(lon, lat, 0.0),
        })
    }

    /// Earth CRS given by EPSG code, geodetic side WGS84.
    pub fn from_epsg(epsg: u32, origin: [f64; 2]) -> Result<Self> {
        Self::new("Earth", &format!("EPSG:{epsg}"), "EPSG:4326", origin)
    }
}

impl ProjectionTransform for ProjTransform {
    fn globe_name(&self) -> &str {
        &self.globe
    }

    fn projected_to_geodetic(&self, point: DVec3) -> Result<DVec3> {
        let (lon, lat) = self
            .to_geodetic
            .convert((point.x + self.origin.x, point.y + self.origin.y))
            .map_err(|e| TerrainError::Projection(format!("Projection failed: {e}")))?;
        Ok(DVec3::new(lon, lat, point.z))
    }

    fn geodetic_to_projected(&self, point: DVec3) -> Result<DVec3> {
        let (x, y) = self
            .to_projected
            .convert((point.x, point.y))
            .map_err(|e| TerrainError::Projection(format!("Projection failed: {e}")))?;
        Ok(DVec3::new(x - self.origin.x, y - self.origin.y, point.z))
    }

    fn center_geodetic(&self) -> DVec3 {
        self.center
    }
}
