//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator tile coordinates, plus enumeration of the tiles covering
//! a geographic bounding box at a given zoom level. Preload planning in the
//! worker is built on these conversions.

mod types;

pub use types::{CoordError, LatLngBounds, TileCoord, MAX_LAT, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM};

use std::f64::consts::PI;

/// Maximum number of tiles a single enumeration may produce.
///
/// Wide bounds at high zoom describe billions of tiles; materializing them
/// would exhaust memory long before any fetch could run. Callers splitting
/// larger regions must do so explicitly.
pub const MAX_ENUMERATED_TILES: u64 = 10_000;

/// Converts geographic coordinates to tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (1 to 18)
///
/// # Returns
///
/// A `Result` containing the tile coordinates or an error if inputs are invalid.
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    // Validate inputs
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if !(MIN_ZOOM..=MAX_ZOOM).contains(&zoom) {
        return Err(CoordError::InvalidZoom(zoom));
    }

    // Number of tiles along each axis at this zoom level
    let n = 2.0_f64.powi(zoom as i32);

    // Convert longitude to tile X coordinate
    let col = (((lon + 180.0) / 360.0 * n) as u32).min(n as u32 - 1);

    // Convert latitude to tile Y coordinate using Web Mercator projection
    let lat_rad = lat * PI / 180.0;
    let row = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n) as u32).min(n as u32 - 1);

    Ok(TileCoord { row, col, zoom })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);
    let lon = tile.col as f64 / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * tile.row as f64 / n)).sinh().atan();
    (lat_rad * 180.0 / PI, lon)
}

/// Enumerates the tiles covering a bounding box at the given zoom level.
///
/// The returned tiles span the inclusive rectangle from the northwest corner
/// tile to the southeast corner tile, in row-major order. Latitudes are
/// clamped to the Web Mercator range before conversion so bounds touching
/// the poles remain valid.
///
/// # Arguments
///
/// * `bounds` - Geographic bounding box (north > south)
/// * `zoom` - Zoom level (1 to 18)
///
/// # Errors
///
/// Returns `CoordError` if the bounds are malformed, the zoom is out of
/// range, or the rectangle covers more than [`MAX_ENUMERATED_TILES`] tiles.
pub fn tiles_in_bounds(bounds: &LatLngBounds, zoom: u8) -> Result<Vec<TileCoord>, CoordError> {
    bounds.validate()?;

    let north = bounds.north.clamp(MIN_LAT, MAX_LAT);
    let south = bounds.south.clamp(MIN_LAT, MAX_LAT);

    let nw = to_tile_coords(north, bounds.west, zoom)?;
    let se = to_tile_coords(south, bounds.east, zoom)?;

    // Widen before multiplying: spans reach 2^18 each at max zoom, so the
    // product can overflow u32 but always fits in u64
    let count = (u64::from(se.row - nw.row) + 1) * (u64::from(se.col - nw.col) + 1);
    if count > MAX_ENUMERATED_TILES {
        return Err(CoordError::TooManyTiles {
            tiles: count,
            limit: MAX_ENUMERATED_TILES,
        });
    }

    let mut tiles = Vec::with_capacity(count as usize);
    for row in nw.row..=se.row {
        for col in nw.col..=se.col {
            tiles.push(TileCoord { row, col, zoom });
        }
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_tile_coords_equator_origin() {
        // Lat 0, lon 0 at zoom 2 lands in the middle of the grid
        let tile = to_tile_coords(0.0, 0.0, 2).unwrap();
        assert_eq!(tile.row, 2);
        assert_eq!(tile.col, 2);
        assert_eq!(tile.zoom, 2);
    }

    #[test]
    fn test_to_tile_coords_rejects_bad_latitude() {
        let result = to_tile_coords(91.0, 0.0, 5);
        assert!(matches!(result, Err(CoordError::InvalidLatitude(_))));
    }

    #[test]
    fn test_to_tile_coords_rejects_bad_longitude() {
        let result = to_tile_coords(0.0, -200.0, 5);
        assert!(matches!(result, Err(CoordError::InvalidLongitude(_))));
    }

    #[test]
    fn test_to_tile_coords_rejects_zoom_out_of_range() {
        assert!(matches!(
            to_tile_coords(0.0, 0.0, 0),
            Err(CoordError::InvalidZoom(0))
        ));
        assert!(matches!(
            to_tile_coords(0.0, 0.0, 19),
            Err(CoordError::InvalidZoom(19))
        ));
    }

    #[test]
    fn test_round_trip_northwest_corner() {
        let tile = to_tile_coords(47.6, -122.3, 12).unwrap();
        let (lat, lon) = tile_to_lat_lon(&tile);
        // Northwest corner must be north and west of the original point
        assert!(lat >= 47.6);
        assert!(lon <= -122.3);
    }

    #[test]
    fn test_tiles_in_bounds_single_tile() {
        // A tiny box well inside one tile
        let bounds = LatLngBounds::new(47.61, 47.60, -122.30, -122.31).unwrap();
        let tiles = tiles_in_bounds(&bounds, 10).unwrap();
        assert_eq!(tiles.len(), 1);
    }

    #[test]
    fn test_tiles_in_bounds_rectangle() {
        let bounds = LatLngBounds::new(48.0, 47.0, -121.0, -123.0).unwrap();
        let tiles = tiles_in_bounds(&bounds, 8).unwrap();
        assert!(!tiles.is_empty());

        // Row-major, contiguous rectangle
        let min_row = tiles.iter().map(|t| t.row).min().unwrap();
        let max_row = tiles.iter().map(|t| t.row).max().unwrap();
        let min_col = tiles.iter().map(|t| t.col).min().unwrap();
        let max_col = tiles.iter().map(|t| t.col).max().unwrap();
        assert_eq!(
            tiles.len() as u32,
            (max_row - min_row + 1) * (max_col - min_col + 1)
        );
    }

    #[test]
    fn test_tiles_in_bounds_grows_with_zoom() {
        let bounds = LatLngBounds::new(48.0, 47.0, -121.0, -123.0).unwrap();
        let coarse = tiles_in_bounds(&bounds, 8).unwrap();
        let fine = tiles_in_bounds(&bounds, 11).unwrap();
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn test_tiles_in_bounds_rejects_oversized_enumeration() {
        // Whole-world bounds at high zoom describe billions of tiles; the
        // enumeration must reject them instead of trying to allocate
        let world = LatLngBounds::new(85.0, -85.0, 180.0, -180.0).unwrap();
        let result = tiles_in_bounds(&world, 16);
        assert!(matches!(
            result,
            Err(CoordError::TooManyTiles { tiles, limit })
                if tiles > limit && limit == MAX_ENUMERATED_TILES
        ));

        // The same bounds are fine at a coarse zoom
        let tiles = tiles_in_bounds(&world, 4).unwrap();
        assert!(!tiles.is_empty());
        assert!(tiles.len() as u64 <= MAX_ENUMERATED_TILES);
    }

    #[test]
    fn test_tiles_in_bounds_clamps_polar_latitudes() {
        let bounds = LatLngBounds::new(89.9, 80.0, 10.0, 0.0).unwrap();
        let tiles = tiles_in_bounds(&bounds, 4).unwrap();
        assert!(!tiles.is_empty());
    }
}
