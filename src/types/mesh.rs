/// Height-sampled vertex grid for one tile.
///
/// Vertices sit at pixel centres, row-major from the north-west corner,
/// with x/y relative to the tile centre. Buffers are contiguous `Vec<f32>`
/// for zero-copy upload by the renderer.
#[derive(Debug, Clone, Default)]
pub struct TileMesh {
    pub columns: usize,
    pub rows: usize,
    /// Horizontal sample spacing (local frame units).
    pub pixel_width: f64,
    pub pixel_length: f64,
    /// Interleaved positions: [x, y, z, x, y, z, ...]; z is NaN where the
    /// raster had no data.
    pub positions: Vec<f32>,
    /// Every sample is missing (sparse-pyramid padding).
    pub empty: bool,
}

impl TileMesh {
    /// Number of vertices (positions / 3).
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Height of the sample at `(column, row)`, NaN when missing.
    pub fn height(&self, column: usize, row: usize) -> f32 {
        self.positions[(row * self.columns + column) * 3 + 2]
    }

    /// All heights in row-major order.
    pub fn heights(&self) -> impl Iterator<Item = f32> + '_ {
        self.positions.chunks_exact(3).map(|v| v[2])
    }

    /// Horizontal extent covered by the grid: `(columns * pw, rows * pl)`.
    pub fn extent(&self) -> (f64, f64) {
        (
            self.columns as f64 * self.pixel_width,
            self.rows as f64 * self.pixel_length,
        )
    }
}
