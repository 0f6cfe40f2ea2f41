//! Tile coordinate types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Northern latitude limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.05112878;
/// Southern latitude limit of the Web Mercator projection.
pub const MIN_LAT: f64 = -85.05112878;
/// Western longitude limit.
pub const MIN_LON: f64 = -180.0;
/// Eastern longitude limit.
pub const MAX_LON: f64 = 180.0;
/// Highest zoom level accepted by the conversions.
pub const MAX_ZOOM: u8 = 22;

/// Errors raised by coordinate conversions.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Latitude outside the Web Mercator range.
    InvalidLatitude(f64),
    /// Longitude outside -180..=180.
    InvalidLongitude(f64),
    /// Zoom level above [`MAX_ZOOM`].
    InvalidZoom(u8),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLatitude(lat) => write!(
                f,
                "latitude {} outside Web Mercator range [{}, {}]",
                lat, MIN_LAT, MAX_LAT
            ),
            CoordError::InvalidLongitude(lon) => {
                write!(f, "longitude {} outside [{}, {}]", lon, MIN_LON, MAX_LON)
            }
            CoordError::InvalidZoom(zoom) => {
                write!(f, "zoom {} exceeds maximum {}", zoom, MAX_ZOOM)
            }
        }
    }
}

impl std::error::Error for CoordError {}

/// Address of one tile in the slippy-map pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Relative path of the tile file inside a region folder (`z/x/y.pbf`).
    pub fn relative_path(&self) -> String {
        format!("{}/{}/{}.pbf", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive rectangle of tiles at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Number of tiles covered by the range.
    pub fn tile_count(&self) -> u64 {
        let width = (self.max_x - self.min_x) as u64 + 1;
        let height = (self.max_y - self.min_y) as u64 + 1;
        width * height
    }

    /// Returns true if the tile lies inside the range.
    pub fn contains(&self, tile: &TileCoordinate) -> bool {
        tile.zoom == self.zoom
            && (self.min_x..=self.max_x).contains(&tile.x)
            && (self.min_y..=self.max_y).contains(&tile.y)
    }

    /// Iterate over every tile in the range, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_x..=self.max_x).map(move |x| TileCoordinate::new(self.zoom, x, y))
        })
    }
}
