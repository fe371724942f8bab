//! Tile addressing.
//!
//! Every tile maps to one row and one column of the "Tiles" table:
//!
//! ```text
//!   TileCoord { layer, x, y, z }
//!        │
//!        ├── row key    = layer (UTF-8)
//!        │
//!        └── column key = z (u32 BE) ++ interleave2(x, y) (u32 BE)
//!                         └──── 4 ────┘  └──────── 4 ────────┘
//! ```
//!
//! One row per layer makes invalidating a whole layer a single row delete.
//! Big-endian packing makes the byte order of column keys equal to their
//! numeric order, so within a zoom level the store keeps tiles in Z-order
//! and geographically adjacent tiles sit next to each other on disk.
//!
//! # Example
//!
//! ```
//! use tilecache_cassandra::key::{ColumnKey, TileCoord};
//!
//! let coord = TileCoord::new("basic", 5, 2, 3);
//! assert_eq!(coord.row_key(), "basic");
//! assert_eq!(coord.column_key().as_bytes(), &[0, 0, 0, 3, 0, 0, 0, 0x19]);
//! assert_eq!(coord.lock_key(), "basic/5/2/3");
//! ```
//!
//! Grid coordinates must stay below 65536. Larger values are masked to 16
//! bits by the interleave and alias other tiles; they are not rejected.

mod morton;

use std::fmt;

pub use morton::{compact1by1, deinterleave2, interleave2, part1by1};

/// Length of an encoded column key in bytes.
pub const COLUMN_KEY_LEN: usize = 8;

/// Largest grid coordinate that survives interleaving without aliasing.
pub const MAX_GRID_COORD: u32 = 0xFFFF;

// =============================================================================
// Tile Coordinate
// =============================================================================

/// Identifies a single cached tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Layer name, unique per configured layer
    pub layer: String,

    /// Grid column at zoom `z`
    pub x: u32,

    /// Grid row at zoom `z`
    pub y: u32,

    /// Zoom level
    pub z: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(layer: impl Into<String>, x: u32, y: u32, z: u32) -> Self {
        Self {
            layer: layer.into(),
            x,
            y,
            z,
        }
    }

    /// Row holding every tile of this layer.
    pub fn row_key(&self) -> &str {
        &self.layer
    }

    /// Column holding this tile within its layer's row.
    pub fn column_key(&self) -> ColumnKey {
        ColumnKey::new(self.z, interleave2(self.x, self.y))
    }

    /// Name of the advisory render lock for this tile.
    pub fn lock_key(&self) -> String {
        format!("{}/{}/{}/{}", self.layer, self.x, self.y, self.z)
    }

    /// Whether `x` and `y` both fit the 16-bit interleave without aliasing.
    pub fn fits_grid(&self) -> bool {
        self.x <= MAX_GRID_COORD && self.y <= MAX_GRID_COORD
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.layer, self.z, self.x, self.y)
    }
}

// =============================================================================
// Column Key
// =============================================================================

/// 8-byte column name: zoom then Morton code, both big-endian.
///
/// The derived ordering compares the raw bytes, which is also the order the
/// store sorts columns in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey([u8; COLUMN_KEY_LEN]);

impl ColumnKey {
    /// Pack a zoom level and Morton code.
    pub fn new(zoom: u32, morton: u32) -> Self {
        let mut bytes = [0u8; COLUMN_KEY_LEN];
        bytes[..4].copy_from_slice(&zoom.to_be_bytes());
        bytes[4..].copy_from_slice(&morton.to_be_bytes());
        Self(bytes)
    }

    /// Parse a column name read back from the store.
    ///
    /// Returns `None` unless `bytes` is exactly 8 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; COLUMN_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw column name bytes.
    pub fn as_bytes(&self) -> &[u8; COLUMN_KEY_LEN] {
        &self.0
    }

    /// Zoom level half of the key.
    pub fn zoom(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Morton code half of the key.
    pub fn morton(&self) -> u32 {
        u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    /// Recover the `(x, y)` grid coordinates.
    pub fn grid(&self) -> (u32, u32) {
        deinterleave2(self.morton())
    }
}

impl AsRef<[u8]> for ColumnKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// =============================================================================
// Tests
// =============================================================================
