use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::transform::ProjectionInfo;

/// Globe a terrain lies on, for the equirectangular reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Globe {
    #[value(name = "earth")]
    Earth,
    #[value(name = "mars")]
    Mars,
    #[value(name = "moon")]
    Moon,
}

impl Globe {
    /// Mean radius in metres.
    pub fn radius(self) -> f64 {
        match self {
            Globe::Earth => 6_371_000.0,
            Globe::Mars => 3_396_190.0,
            Globe::Moon => 1_737_400.0,
        }
    }
}

impl std::fmt::Display for Globe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Globe::Earth => write!(f, "Earth"),
            Globe::Mars => write!(f, "Mars"),
            Globe::Moon => write!(f, "Moon"),
        }
    }
}

/// Level-of-detail parameters.
#[derive(Debug, Clone)]
pub struct LodConfig {
    /// Refine a tile while its sample spacing projects to more screen
    /// pixels than this.
    pub max_pixel_error: f64,
    /// Deepest level the walk may select; `None` for the pyramid base.
    pub max_level: Option<usize>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_pixel_error: 1.5,
            max_level: None,
        }
    }
}

/// Fully resolved terrain configuration.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Background tile-build threads.
    pub workers: usize,
    /// Bounded build queue length.
    pub queue_capacity: usize,
    pub lod: LodConfig,
    /// RGBA surface colour applied to every tile.
    pub surface_color: [f32; 4],
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 256,
            lod: LodConfig::default(),
            surface_color: [1.0; 4],
        }
    }
}

/// Decimal places and default sampling cell for reporting values of one
/// terrain, chosen from its horizontal extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayFormat {
    pub decimals: usize,
    pub default_cell_size: f64,
}

impl DisplayFormat {
    pub fn for_extent(extent: f64) -> Self {
        let magnitude = if extent > 0.0 { extent.log10().floor() as i32 } else { 0 };
        if magnitude >= 3 {
            Self {
                decimals: 3,
                default_cell_size: 10f64.powi(magnitude - 1) / 2.0,
            }
        } else if magnitude > 1 {
            Self {
                decimals: 3,
                default_cell_size: 1.0,
            }
        } else {
            Self {
                decimals: 5,
                default_cell_size: 10f64.powi(magnitude) / 100.0,
            }
        }
    }

    pub fn format(&self, value: f64) -> String {
        format!("{value:.*}", self.decimals)
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "quadterrain",
    about = "Quadtree terrain engine over tiled elevation pyramids",
    version
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Rayon thread count (default: all cores)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// Background tile-build workers
    #[arg(long, global = true, default_value_t = 5)]
    pub workers: usize,

    /// Tile-build queue capacity
    #[arg(long, global = true, default_value_t = 256)]
    pub queue_capacity: usize,

    /// Screen-space error threshold in pixels
    #[arg(long, global = true, default_value_t = 1.5)]
    pub max_pixel_error: f64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tile a raw f32 elevation grid into a pyramid directory
    Build(BuildArgs),
    /// Print pyramid and terrain metadata
    Info(PyramidArgs),
    /// Sample elevation and normal at a local point
    Sample(SampleArgs),
    /// Region statistics over a local rectangle
    Stats(StatsArgs),
    /// Render one tile's elevation to a PNG
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Raw native-endian f32 grid, row 0 = north
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Output pyramid directory
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Grid width in samples
    #[arg(long)]
    pub width: usize,

    /// Grid length (rows) in samples
    #[arg(long)]
    pub length: usize,

    /// Samples per tile side
    #[arg(long, default_value_t = 256)]
    pub tile_size: usize,

    /// Pixel width in projected units
    #[arg(long, default_value_t = 1.0)]
    pub pixel_width: f64,

    /// Pixel length (default: pixel width)
    #[arg(long)]
    pub pixel_length: Option<f64>,

    /// No-data sample value (NaN is always missing)
    #[arg(long)]
    pub fill: Option<f32>,

    /// EPSG code of the grid CRS (e.g. 32636)
    #[arg(long, conflicts_with = "globe")]
    pub epsg: Option<u32>,

    /// Grid centre easting in the EPSG CRS
    #[arg(long)]
    pub easting: Option<f64>,

    /// Grid centre northing in the EPSG CRS
    #[arg(long)]
    pub northing: Option<f64>,

    /// Globe for an equirectangular reference
    #[arg(long, value_enum)]
    pub globe: Option<Globe>,

    /// Centre longitude in degrees (with --globe)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub center_lon: f64,

    /// Centre latitude in degrees (with --globe)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub center_lat: f64,
}

impl BuildArgs {
    /// Spatial reference requested on the command line, if any.
    pub fn projection(&self) -> Option<ProjectionInfo> {
        if let Some(epsg) = self.epsg {
            return Some(ProjectionInfo::Crs {
                globe: Globe::Earth.to_string(),
                crs: format!("EPSG:{epsg}"),
                geographic_crs: "EPSG:4326".into(),
                origin: [self.easting.unwrap_or(0.0), self.northing.unwrap_or(0.0)],
            });
        }
        self.globe.map(|globe| ProjectionInfo::Equirectangular {
            globe: globe.to_string(),
            radius: globe.radius(),
            center_lon: self.center_lon,
            center_lat: self.center_lat,
        })
    }
}

#[derive(Args, Debug)]
pub struct PyramidArgs {
    /// Pyramid directory
    pub pyramid: PathBuf,
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Pyramid directory
    pub pyramid: PathBuf,

    /// Local x (east of centre, projected units)
    #[arg(allow_negative_numbers = true)]
    pub x: f64,

    /// Local y (north of centre, projected units)
    #[arg(allow_negative_numbers = true)]
    pub y: f64,

    /// Sample a specific pyramid level instead of full resolution
    #[arg(long)]
    pub level: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Pyramid directory
    pub pyramid: PathBuf,

    #[arg(long, allow_negative_numbers = true)]
    pub min_x: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub min_y: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub max_x: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub max_y: f64,

    /// Reference elevation for cut/fill volume
    #[arg(long, allow_negative_numbers = true)]
    pub reference: Option<f64>,

    /// Sampling cell size (default: full-resolution pixel)
    #[arg(long)]
    pub cell_size: Option<f64>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Pyramid directory
    pub pyramid: PathBuf,

    /// Tile key, e.g. root or 1_3
    #[arg(long, default_value = "root")]
    pub key: String,

    /// Output PNG path
    #[arg(short = 'o', long)]
    pub output: PathBuf,
}

impl From<&CliArgs> for TerrainConfig {
    fn from(args: &CliArgs) -> Self {
        TerrainConfig {
            workers: args.workers,
            queue_capacity: args.queue_capacity,
            lod: LodConfig {
                max_pixel_error: args.max_pixel_error,
                ..LodConfig::default()
            },
            ..TerrainConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_terrain_config() {
        let tc = TerrainConfig::default();
        assert_eq!(tc.workers, 5);
        assert_eq!(tc.queue_capacity, 256);
        assert_eq!(tc.lod.max_pixel_error, 1.5);
        assert_eq!(tc.lod.max_level, None);
        assert_eq!(tc.surface_color, [1.0; 4]);
    }

    #[test]
    fn globe_display_and_radius() {
        assert_eq!(Globe::Earth.to_string(), "Earth");
        assert_eq!(Globe::Mars.to_string(), "Mars");
        assert_eq!(Globe::Moon.to_string(), "Moon");
        assert!(Globe::Mars.radius() < Globe::Earth.radius());
    }

    #[test]
    fn display_format_by_extent() {
        let km = DisplayFormat::for_extent(25_000.0);
        assert_eq!(km.decimals, 3);
        assert_eq!(km.default_cell_size, 500.0);

        let field = DisplayFormat::for_extent(250.0);
        assert_eq!(field.decimals, 3);
        assert_eq!(field.default_cell_size, 1.0);

        let bench = DisplayFormat::for_extent(0.5);
        assert_eq!(bench.decimals, 5);
        assert!((bench.default_cell_size - 0.001).abs() < 1e-15);
        assert_eq!(bench.format(0.123456), "0.12346");
    }

    #[test]
    fn cli_build_args() {
        let args = CliArgs::parse_from([
            "quadterrain",
            "build",
            "-i",
            "dem.f32",
            "-o",
            "./pyramid",
            "--width",
            "1000",
            "--length",
            "800",
            "--tile-size",
            "128",
            "--epsg",
            "32636",
            "--easting",
            "500000",
            "--northing",
            "2800000",
            "-v",
            "-j",
            "8",
            "--workers",
            "3",
        ]);
        assert!(args.verbose);
        assert_eq!(args.threads, Some(8));
        let config = TerrainConfig::from(&args);
        assert_eq!(config.workers, 3);

        let Command::Build(build) = args.command else {
            panic!("expected build command");
        };
        assert_eq!(build.input, PathBuf::from("dem.f32"));
        assert_eq!(build.width, 1000);
        assert_eq!(build.tile_size, 128);
        assert_eq!(
            build.projection(),
            Some(ProjectionInfo::Crs {
                globe: "Earth".into(),
                crs: "EPSG:32636".into(),
                geographic_crs: "EPSG:4326".into(),
                origin: [500_000.0, 2_800_000.0],
            })
        );
    }

    #[test]
    fn cli_build_with_globe() {
        let args = CliArgs::parse_from([
            "quadterrain",
            "build",
            "-i",
            "dem.f32",
            "-o",
            "out",
            "--width",
            "10",
            "--length",
            "10",
            "--globe",
            "mars",
            "--center-lat",
            "-4.5",
        ]);
        let Command::Build(build) = args.command else {
            panic!("expected build command");
        };
        match build.projection() {
            Some(ProjectionInfo::Equirectangular { globe, center_lat, .. }) => {
                assert_eq!(globe, "Mars");
                assert_eq!(center_lat, -4.5);
            }
            other => panic!("unexpected projection {other:?}"),
        }
    }

    #[test]
    fn cli_stats_minimal() {
        let args = CliArgs::parse_from([
            "quadterrain",
            "stats",
            "pyr",
            "--min-x",
            "-5",
            "--min-y",
            "-5",
            "--max-x",
            "5",
            "--max-y",
            "5",
        ]);
        let config = TerrainConfig::from(&args);
        assert_eq!(config.workers, 5);
        assert_eq!(config.lod.max_pixel_error, 1.5);
        let Command::Stats(stats) = args.command else {
            panic!("expected stats command");
        };
        assert_eq!(stats.min_x, -5.0);
        assert_eq!(stats.reference, None);
        assert!(!args.verbose);
    }
}
