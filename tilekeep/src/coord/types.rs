//! Coordinate types shared across the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Minimum supported zoom level.
pub const MIN_ZOOM: u8 = 1;

/// Maximum supported zoom level.
pub const MAX_ZOOM: u8 = 18;

/// A single map tile identified by zoom level and grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Tile row (Y axis, increasing southward).
    pub row: u32,
    /// Tile column (X axis, increasing eastward).
    pub col: u32,
    /// Zoom level.
    pub zoom: u8,
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// A geographic bounding box.
///
/// `north` must be strictly greater than `south` and `east` strictly greater
/// than `west`; boxes crossing the antimeridian are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl LatLngBounds {
    /// Create a validated bounding box.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self, CoordError> {
        let bounds = Self {
            north,
            south,
            east,
            west,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check the box invariants without constructing.
    pub fn validate(&self) -> Result<(), CoordError> {
        if !self.north.is_finite()
            || !self.south.is_finite()
            || !self.east.is_finite()
            || !self.west.is_finite()
            || self.north <= self.south
            || self.east <= self.west
        {
            return Err(CoordError::InvalidBounds {
                north: self.north,
                south: self.south,
                east: self.east,
                west: self.west,
            });
        }
        Ok(())
    }

    /// Center point of the box as (lat, lon).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    /// The smaller of the box's latitude and longitude spans, in degrees.
    pub fn min_span(&self) -> f64 {
        (self.north - self.south).min(self.east - self.west)
    }
}

/// Errors from coordinate conversion.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0}")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(f64),

    #[error("Invalid zoom level: {0}")]
    InvalidZoom(u8),

    #[error("Invalid bounds: n={north} s={south} e={east} w={west}")]
    InvalidBounds {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    #[error("Bounds cover {tiles} tiles at this zoom (limit: {limit})")]
    TooManyTiles { tiles: u64, limit: u64 },
}
