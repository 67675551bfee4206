pub mod equirectangular;
pub mod projection;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

pub use equirectangular::Equirectangular;
pub use projection::ProjTransform;

/// Conversion between the terrain's projected frame and geodetic
/// coordinates on its globe.
///
/// The projected frame is centred on the terrain: `(0, 0)` is the terrain
/// centre. Geodetic points are `(longitude, latitude, elevation)` with
/// angles in degrees. The elevation component passes through unchanged.
pub trait ProjectionTransform {
    /// Name of the globe the terrain lies on ("Earth", "Mars", ...).
    fn globe_name(&self) -> &str;

    fn projected_to_geodetic(&self, point: DVec3) -> Result<DVec3>;

    fn geodetic_to_projected(&self, point: DVec3) -> Result<DVec3>;

    /// Longitude and latitude of the terrain centre, elevation 0.
    fn center_geodetic(&self) -> DVec3;
}

/// Spatial reference stored alongside a pyramid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionInfo {
    /// Spherical plate carrée about the terrain centre.
    Equirectangular {
        globe: String,
        radius: f64,
        center_lon: f64,
        center_lat: f64,
    },
    /// Any PROJ-known CRS; `origin` is the terrain centre in that CRS.
    Crs {
        globe: String,
        crs: String,
        geographic_crs: String,
        origin: [f64; 2],
    },
}

impl ProjectionInfo {
    pub fn build(&self) -> Result<Box<dyn ProjectionTransform>> {
        match self {
            ProjectionInfo::Equirectangular {
                globe,
                radius,
                center_lon,
                center_lat,
            } => {
                info!(globe = %globe, radius, center_lon, center_lat, "Using equirectangular projection");
                Ok(Box::new(Equirectangular::new(globe, *radius, *center_lon, *center_lat)?))
            }
            ProjectionInfo::Crs {
                globe,
                crs,
                geographic_crs,
                origin,
            } => {
                info!(globe = %globe, crs = %crs, "Using PROJ transform");
                Ok(Box::new(ProjTransform::new(globe, crs, geographic_crs, *origin)?))
            }
        }
    }
}
