//! Drivers behind the `quadterrain` subcommands.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use glam::{DVec2, DVec3};
use memmap2::Mmap;
use tracing::info;

use crate::config::{BuildArgs, CliArgs, Command, PreviewArgs, SampleArgs, StatsArgs, TerrainConfig};
use crate::error::{Result, TerrainError};
use crate::geometry::{PlaneEquation, Polygon};
use crate::layer::{ColorRampLayer, Layer};
use crate::quadtree::TileKey;
use crate::raster::memory::PyramidLayout;
use crate::raster::{FilePyramid, MemoryPyramid, write_pyramid};
use crate::terrain::{CancelToken, DifferenceGrid, Terrain, Volume};

/// Run the subcommand selected on the command line.
pub fn run(args: &CliArgs) -> Result<()> {
    let config = TerrainConfig::from(args);
    match &args.command {
        Command::Build(build_args) => {
            let start = Instant::now();
            let tiles = build(build_args)?;
            println!(
                "Done: {} tiles written in {:.2}s",
                tiles,
                start.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Command::Info(pyramid_args) => {
            let terrain = open_terrain(&pyramid_args.pyramid, config)?;
            print_info(&terrain);
            terrain.dispose();
            Ok(())
        }
        Command::Sample(sample_args) => sample(sample_args, config),
        Command::Stats(stats_args) => stats(stats_args, config),
        Command::Preview(preview_args) => preview(preview_args, config),
    }
}

/// Tile a raw `f32` grid into a pyramid directory. Returns the number of
/// tiles written.
pub fn build(args: &BuildArgs) -> Result<usize> {
    let grid = read_grid(&args.input, args.width, args.length)?;
    let layout = PyramidLayout {
        tile_width: args.tile_size,
        tile_length: args.tile_size,
        pixel_width: args.pixel_width,
        pixel_length: args.pixel_length.unwrap_or(args.pixel_width),
        fill_value: args.fill.unwrap_or(f32::NAN),
        projection: args.projection(),
    };
    info!(
        input = %args.input.display(),
        width = args.width,
        length = args.length,
        tile_size = args.tile_size,
        "Building elevation pyramid"
    );
    let pyramid = MemoryPyramid::from_grid(&grid, args.width, args.length, layout)?;
    write_pyramid(&pyramid, &args.output)
}

/// Open a pyramid directory as a terrain without texture layers.
pub fn open_terrain(dir: &Path, config: TerrainConfig) -> Result<Terrain> {
    let source = Arc::new(FilePyramid::open(dir)?);
    Terrain::new(source, Vec::new(), config)
}

fn read_grid(path: &Path, width: usize, length: usize) -> Result<Vec<f32>> {
    let file = File::open(path)
        .map_err(|e| TerrainError::Raster(format!("Failed to open {}: {e}", path.display())))?;
    // SAFETY: the input is only read while the map is alive.
    let mmap = unsafe { Mmap::map(&file)? };
    let samples: &[f32] = bytemuck::try_cast_slice(&mmap).map_err(|e| {
        TerrainError::Raster(format!("{} is not an f32 grid: {e}", path.display()))
    })?;
    if samples.len() != width * length {
        return Err(TerrainError::Raster(format!(
            "{} holds {} samples, expected {width}x{length}",
            path.display(),
            samples.len()
        )));
    }
    Ok(samples.to_vec())
}

fn print_info(terrain: &Terrain) {
    let info = terrain.info();
    let fmt = terrain.display_format();
    println!("=== Pyramid ===");
    println!("  Raster:      {} x {} samples", info.raster_width, info.raster_length);
    println!("  Tiles:       {} x {} samples", info.tile_width, info.tile_length);
    println!("  Levels:      {}", info.levels);
    println!(
        "  Pixel size:  {} x {}",
        fmt.format(info.pixel_width),
        fmt.format(info.pixel_length)
    );
    println!(
        "  Elevation:   {} → {}",
        fmt.format(info.min_elevation),
        fmt.format(info.max_elevation)
    );
    println!();
    println!("=== Terrain ===");
    let bb = terrain.bounds();
    println!(
        "  Bounds:      ({:.3}, {:.3}, {:.3}) → ({:.3}, {:.3}, {:.3})",
        bb.min[0], bb.min[1], bb.min[2], bb.max[0], bb.max[1], bb.max[2]
    );
    println!("  Pixel scale: {}", terrain.pixel_scale());
    println!("  Base level:  {}", terrain.base_map_level());
    println!("  Cell size:   {}", fmt.format(fmt.default_cell_size));
    match terrain.globe_name() {
        Some(globe) => {
            println!("  Globe:       {globe}");
            match terrain.center_geodetic() {
                Ok(c) => println!("  Centre:      {:.6}°, {:.6}° at {}", c.x, c.y, fmt.format(c.z)),
                Err(e) => println!("  Centre:      unavailable ({e})"),
            }
        }
        None => println!("  Globe:       none (no spatial reference)"),
    }
}

fn sample(args: &SampleArgs, config: TerrainConfig) -> Result<()> {
    let terrain = open_terrain(&args.pyramid, config)?;
    let fmt = terrain.display_format();
    let local = terrain.projected_to_local(DVec3::new(args.x, args.y, 0.0));

    let elevation = match args.level {
        Some(level) => terrain.elevation_at_level(local.x, local.y, level),
        None => terrain.elevation_at_full_resolution(local.x, local.y),
    };
    println!("=== Sample ({}, {}) ===", fmt.format(args.x), fmt.format(args.y));
    if elevation.is_nan() {
        println!("  Elevation: no data");
    } else {
        println!("  Elevation: {}", fmt.format(elevation));
    }
    match terrain.normal_at_full_resolution(local.x, local.y) {
        Some(n) => println!("  Normal:    ({:.4}, {:.4}, {:.4})", n.x, n.y, n.z),
        None => println!("  Normal:    undefined"),
    }
    if terrain.globe_name().is_some() && !elevation.is_nan() {
        let geo = terrain.projected_to_geodetic(DVec3::new(args.x, args.y, elevation))?;
        println!("  Geodetic:  {:.6}°, {:.6}°", geo.x, geo.y);
    }
    terrain.dispose();
    Ok(())
}

/// Figures reported by `stats` for one rectangle.
struct RegionStats {
    mean: f64,
    slope: f64,
    area: f64,
    /// Cut/fill against the reference level, when one is defined.
    reference: Option<ReferenceStats>,
}

struct ReferenceStats {
    elevation: f64,
    volume: Volume,
    difference: DifferenceGrid,
}

fn stats(args: &StatsArgs, config: TerrainConfig) -> Result<()> {
    let terrain = open_terrain(&args.pyramid, config)?;
    let fmt = terrain.display_format();
    let cancel = CancelToken::new();

    let start = Instant::now();
    let Some(region) = region_stats(&terrain, args, &cancel)? else {
        info!(elapsed = ?start.elapsed(), "Region statistics cancelled");
        terrain.dispose();
        return Ok(());
    };

    println!("=== Region Statistics ===");
    println!("  Mean elevation: {}", fmt.format(region.mean));
    println!("  Mean slope:     {:.2}°", region.slope);
    println!("  Surface area:   {}", fmt.format(region.area));
    if let Some(reference) = &region.reference {
        let grid = &reference.difference;
        println!("  Reference:      {}", fmt.format(reference.elevation));
        println!("  Volume above:   {}", fmt.format(reference.volume.above));
        println!("  Volume below:   {}", fmt.format(reference.volume.below));
        println!(
            "  Difference:     {} → {} over {} x {} cells",
            fmt.format(grid.min),
            fmt.format(grid.max),
            grid.columns,
            grid.rows
        );
    }
    info!(elapsed = ?start.elapsed(), "Region statistics complete");
    terrain.dispose();
    Ok(())
}

/// Scan the rectangle of `args` (projected units). `Ok(None)` once `cancel`
/// stops one of the scans.
fn region_stats(terrain: &Terrain, args: &StatsArgs, cancel: &CancelToken) -> Result<Option<RegionStats>> {
    let scale = terrain.pixel_scale();
    let lower = DVec2::new(args.min_x, args.min_y) * scale;
    let upper = DVec2::new(args.max_x, args.max_y) * scale;
    let polygon = Polygon::rectangle(lower, upper, 0.0)?;

    let scan = || -> Option<RegionStats> {
        let mean = terrain.mean_elevation(&polygon, cancel)?;
        let slope = terrain.mean_slope(&polygon, cancel)?;
        let area = terrain.surface_area(&polygon, cancel)?;

        let elevation = args.reference.unwrap_or(mean);
        let reference = if elevation.is_nan() {
            None
        } else {
            let volume = terrain.volume_against_elevation(&polygon, elevation, cancel)?;
            let cell = args.cell_size.map_or(terrain.pixel_width(), |c| c * scale);
            let extent = upper - lower;
            let rows = (extent.y / cell).floor().max(0.0) as usize;
            let columns = (extent.x / cell).floor().max(0.0) as usize;
            let plane = PlaneEquation::horizontal(terrain.frame().height_to_local(elevation));
            let difference = terrain.difference_grid(&polygon, &plane, cell, rows, columns, cancel)?;
            Some(ReferenceStats {
                elevation,
                volume,
                difference,
            })
        };
        Some(RegionStats {
            mean,
            slope,
            area,
            reference,
        })
    };
    Ok(scan())
}

fn preview(args: &PreviewArgs, config: TerrainConfig) -> Result<()> {
    let key: TileKey = args.key.parse()?;
    let terrain = open_terrain(&args.pyramid, config)?;
    let tile = terrain
        .factory()
        .fetch_key(&key, true)
        .ready()
        .ok_or_else(|| TerrainError::Tile(format!("tile {key} could not be built")))?;
    let content = tile
        .content()
        .ok_or_else(|| TerrainError::Tile(format!("tile {key} has no content")))?;

    let ramp = ColorRampLayer::for_raster("preview", terrain.info());
    let texture = ramp
        .texture(&key, &content.mesh)
        .ok_or_else(|| TerrainError::Tile(format!("tile {key} holds no elevation data")))?;
    texture
        .image
        .save(&args.output)
        .map_err(|e| TerrainError::Tile(format!("Failed to write {}: {e}", args.output.display())))?;

    let (w, h) = texture.dimensions();
    println!("Wrote {w}x{h} preview of tile {key} to {}", args.output.display());
    terrain.dispose();
    Ok(())
}
