//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (longitude/latitude)
//! and Web Mercator slippy-map tile addresses used by the offline tile
//! pyramid.

mod types;

pub use types::{
    CoordError, TileCoordinate, TileRange, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
};

use std::f64::consts::PI;

/// Values closer than this to a tile edge snap onto the edge, so the
/// northwest corner of a tile always converts back into the same tile.
const EDGE_EPSILON: f64 = 1e-9;

/// Converts geographic coordinates to a tile address.
///
/// # Arguments
///
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `zoom` - Zoom level (0 to 22)
///
/// # Returns
///
/// A `Result` containing the tile or an error if inputs are invalid.
#[inline]
pub fn lon_lat_to_tile(lon: f64, lat: f64, zoom: u8) -> Result<TileCoordinate, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let max_index = n - 1.0;

    let x = ((lon + 180.0) / 360.0 * n + EDGE_EPSILON).floor();

    // asinh(tan(lat)) == ln(tan(lat) + sec(lat))
    let lat_rad = lat * PI / 180.0;
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n + EDGE_EPSILON).floor();

    Ok(TileCoordinate {
        zoom,
        x: x.clamp(0.0, max_index) as u32,
        y: y.clamp(0.0, max_index) as u32,
    })
}

/// Converts a tile address back to geographic coordinates.
///
/// Returns the `(lon, lat)` of the tile's northwest corner.
#[inline]
pub fn tile_to_lon_lat(tile: &TileCoordinate) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lon, lat)
}

/// Computes the tiles covering a bounding box at one zoom level.
///
/// Latitudes are clamped into the Web Mercator range before conversion.
pub fn tile_range(
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
    zoom: u8,
) -> Result<TileRange, CoordError> {
    let clamp_lat = |lat: f64| lat.clamp(MIN_LAT, MAX_LAT);

    // North-west corner gives the smallest x/y, south-east the largest.
    let nw = lon_lat_to_tile(min_lon, clamp_lat(max_lat), zoom)?;
    let se = lon_lat_to_tile(max_lon, clamp_lat(min_lat), zoom)?;

    Ok(TileRange {
        zoom,
        min_x: nw.x.min(se.x),
        max_x: nw.x.max(se.x),
        min_y: nw.y.min(se.y),
        max_y: nw.y.max(se.y),
    })
}
