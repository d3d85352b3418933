//! Ordered-dither threshold tables.
//!
//! Both tables are stored as raw integer ranks (`0..N²`) indexed `[y][x]`;
//! normalization to a `[0, 1)` offset happens in [`lookup`] so the two matrix
//! sizes can be scaled consistently (or, for [`MatrixNormalization::Legacy`],
//! reproduce the historical 8x8 behavior).

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Dither cell granularity. Only 4 and 8 exist; every other requested size
/// falls back to [`CellSize::Eight`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellSize {
    Four,
    #[default]
    Eight,
}

impl CellSize {
    pub fn from_raw(value: u32) -> Self {
        match value {
            4 => Self::Four,
            8 => Self::Eight,
            other => {
                tracing::debug!(requested = other, "unsupported dither cell size, using 8");
                Self::Eight
            }
        }
    }

    pub fn side(self) -> u32 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

impl Serialize for CellSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.side())
    }
}

/// Any number is accepted; only exactly 4 selects the small matrix.
struct CellSizeVisitor;

impl<'de> Visitor<'de> for CellSizeVisitor {
    type Value = CellSize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a numeric dither cell size")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<CellSize, E> {
        Ok(CellSize::from_raw(u32::try_from(value).unwrap_or(u32::MAX)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<CellSize, E> {
        match u32::try_from(value) {
            Ok(value) => Ok(CellSize::from_raw(value)),
            Err(_) => {
                tracing::debug!(requested = value, "unsupported dither cell size, using 8");
                Ok(CellSize::Eight)
            }
        }
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<CellSize, E> {
        if value == 4.0 {
            return Ok(CellSize::Four);
        }
        if value != 8.0 {
            tracing::debug!(requested = value, "unsupported dither cell size, using 8");
        }
        Ok(CellSize::Eight)
    }
}

impl<'de> Deserialize<'de> for CellSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CellSizeVisitor)
    }
}

/// How raw table ranks are mapped to a threshold offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixNormalization {
    /// Both tables divided by N², giving `[0, 1)` for either size.
    #[default]
    Uniform,
    /// 4x4 divided by 16, 8x8 left as raw ranks `0..=63`.
    Legacy,
}

impl MatrixNormalization {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Uniform => 0,
            Self::Legacy => 1,
        }
    }
}

/// Raw table rank at `(x mod N, y mod N)`.
pub fn rank(cell: CellSize, x: u32, y: u32) -> u8 {
    match cell {
        CellSize::Four => BAYER_4X4[(y % 4) as usize][(x % 4) as usize],
        CellSize::Eight => BAYER_8X8[(y % 8) as usize][(x % 8) as usize],
    }
}

/// Normalized threshold offset for a screen pixel. Pure in `(x mod N, y mod N)`.
pub fn lookup(cell: CellSize, x: u32, y: u32, normalization: MatrixNormalization) -> f32 {
    let raw = f32::from(rank(cell, x, y));
    match (cell, normalization) {
        (CellSize::Four, _) => raw / 16.0,
        (CellSize::Eight, MatrixNormalization::Uniform) => raw / 64.0,
        (CellSize::Eight, MatrixNormalization::Legacy) => raw,
    }
}
