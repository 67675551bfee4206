use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TerrainError};

/// Deepest level a key may address.
pub const MAX_LEVEL: usize = 50;

/// One step of a quadtree path.
///
/// Codes follow the pyramid's on-disk layout:
///   1 = north-west, 2 = north-east, 3 = south-west, 4 = south-east
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quadrant {
    NorthWest = 1,
    NorthEast = 2,
    SouthWest = 3,
    SouthEast = 4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Quadrant::NorthWest),
            2 => Some(Quadrant::NorthEast),
            3 => Some(Quadrant::SouthWest),
            4 => Some(Quadrant::SouthEast),
            _ => None,
        }
    }

    /// Direction of this quadrant's centre from the parent centre as
    /// `(sign_x, sign_y)`.
    pub fn signs(self) -> (f64, f64) {
        match self {
            Quadrant::NorthWest => (-1.0, 1.0),
            Quadrant::NorthEast => (1.0, 1.0),
            Quadrant::SouthWest => (-1.0, -1.0),
            Quadrant::SouthEast => (1.0, -1.0),
        }
    }

    /// Quadrant holding a point at offset `(dx, dy)` from the parent centre.
    /// Points on a dividing line go east / north.
    pub fn containing(dx: f64, dy: f64) -> Self {
        match (dx >= 0.0, dy >= 0.0) {
            (false, true) => Quadrant::NorthWest,
            (true, true) => Quadrant::NorthEast,
            (false, false) => Quadrant::SouthWest,
            (true, false) => Quadrant::SouthEast,
        }
    }
}

/// Address of a quadtree node: the quadrant path from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    path: Vec<Quadrant>,
}

impl TileKey {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_path(path: Vec<Quadrant>) -> Result<Self> {
        if path.len() > MAX_LEVEL {
            return Err(TerrainError::Tile(format!(
                "key depth {} exceeds maximum level {MAX_LEVEL}",
                path.len()
            )));
        }
        Ok(Self { path })
    }

    /// 0 for the root.
    pub fn level(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn path(&self) -> &[Quadrant] {
        &self.path
    }

    /// Last step of the path; `None` for the root.
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.path.last().copied()
    }

    /// Key of the child in `quadrant`, or `None` past [`MAX_LEVEL`].
    pub fn child(&self, quadrant: Quadrant) -> Option<TileKey> {
        if self.path.len() >= MAX_LEVEL {
            return None;
        }
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(quadrant);
        Some(TileKey { path })
    }

    /// The four children in [`Quadrant::ALL`] order.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        Some([
            self.child(Quadrant::NorthWest)?,
            self.child(Quadrant::NorthEast)?,
            self.child(Quadrant::SouthWest)?,
            self.child(Quadrant::SouthEast)?,
        ])
    }

    pub fn parent(&self) -> Option<TileKey> {
        let (_, head) = self.path.split_last()?;
        Some(TileKey {
            path: head.to_vec(),
        })
    }

    /// Key of the tile at `(row, column)` of the `2^level x 2^level` grid of
    /// its level, rows counted from the north.
    pub fn from_grid_index(level: usize, row: usize, column: usize) -> Result<Self> {
        if level > MAX_LEVEL {
            return Err(TerrainError::Tile(format!(
                "level {level} exceeds maximum level {MAX_LEVEL}"
            )));
        }
        let side = 1usize << level;
        if row >= side || column >= side {
            return Err(TerrainError::Tile(format!(
                "grid index ({row}, {column}) outside level {level}"
            )));
        }
        let path = (0..level)
            .rev()
            .map(|bit| {
                let east = (column >> bit) & 1 == 1;
                let south = (row >> bit) & 1 == 1;
                match (east, south) {
                    (false, false) => Quadrant::NorthWest,
                    (true, false) => Quadrant::NorthEast,
                    (false, true) => Quadrant::SouthWest,
                    (true, true) => Quadrant::SouthEast,
                }
            })
            .collect();
        Ok(Self { path })
    }

    /// Inverse of [`TileKey::from_grid_index`]: `(row, column)` at this level.
    pub fn grid_index(&self) -> (usize, usize) {
        self.path.iter().fold((0, 0), |(row, column), q| {
            let (sx, sy) = q.signs();
            (
                row * 2 + usize::from(sy < 0.0),
                column * 2 + usize::from(sx > 0.0),
            )
        })
    }

    /// Storage path below a pyramid directory: `""` for the root, `1/3/2`
    /// for a level-3 key.
    pub fn to_relative_path(&self) -> PathBuf {
        self.path.iter().map(|q| q.code().to_string()).collect()
    }
}

impl fmt::Display for TileKey {
    /// `root`, `1`, `1_3`, `1_3_2`, ...
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str("root");
        }
        for (i, q) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("_")?;
            }
            write!(f, "{}", q.code())?;
        }
        Ok(())
    }
}

impl FromStr for TileKey {
    type Err = TerrainError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "root" {
            return Ok(TileKey::root());
        }
        let path = s
            .split('_')
            .map(|part| {
                part.parse::<u8>()
                    .ok()
                    .and_then(Quadrant::from_code)
                    .ok_or_else(|| TerrainError::Tile(format!("invalid quadrant '{part}' in key '{s}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        TileKey::from_path(path)
    }
}
