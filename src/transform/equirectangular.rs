use glam::DVec3;

use super::ProjectionTransform;
use crate::error::{Result, TerrainError};

/// Spherical equirectangular projection centred on the terrain.
///
/// x = R * cos(lat0) * (lon - lon0), y = R * (lat - lat0), angles in radians.
#[derive(Debug, Clone)]
pub struct Equirectangular {
    globe: String,
    radius: f64,
    center_lon: f64,
    center_lat: f64,
    /// R * cos(lat0)
    parallel_radius: f64,
}

impl Equirectangular {
    pub fn new(globe: impl Into<String>, radius: f64, center_lon: f64, center_lat: f64) -> Result<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(TerrainError::Projection(format!("globe radius must be positive, got {radius}")));
        }
        if !center_lon.is_finite() || !(-90.0..=90.0).contains(&center_lat) {
            return Err(TerrainError::Projection(format!(
                "invalid projection centre ({center_lon}, {center_lat})"
            )));
        }
        let parallel_radius = radius * center_lat.to_radians().cos();
        if parallel_radius < radius * 1e-9 {
            return Err(TerrainError::Projection(format!(
                "equirectangular projection undefined at latitude {center_lat}"
            )));
        }
        Ok(Self {
            globe: globe.into(),
            radius,
            center_lon,
            center_lat,
            parallel_radius,
        })
    }
}

impl ProjectionTransform for Equirectangular {
    fn globe_name(&self) -> &str {
        &self.globe
    }

    fn projected_to_geodetic(&self, point: DVec3) -> Result<DVec3> {
        if !point.is_finite() {
            return Err(TerrainError::Projection(format!("non-finite projected point {point}")));
        }
        let lon = self.center_lon + (point.x / self.parallel_radius).to_degrees();
        let lat = self.center_lat + (point.y / self.radius).to_degrees();
        if lat.abs() > 90.0 {
            return Err(TerrainError::Projection(format!(
                "projected point {point} lies beyond the pole"
            )));
        }
        Ok(DVec3::new(lon, lat, point.z))
    }

    fn geodetic_to_projected(&self, point: DVec3) -> Result<DVec3> {
        if !point.is_finite() || point.y.abs() > 90.0 {
            return Err(TerrainError::Projection(format!("invalid geodetic point {point}")));
        }
        let x = self.parallel_radius * (point.x - self.center_lon).to_radians();
        let y = self.radius * (point.y - self.center_lat).to_radians();
        Ok(DVec3::new(x, y, point.z))
    }

    fn center_geodetic(&self) -> DVec3 {
        DVec3::new(self.center_lon, self.center_lat, 0.0)
    }
}
