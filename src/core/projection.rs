//! Web Mercator tile math.
//!
//! Stateless conversions between WGS84 degrees and fractional tile
//! coordinates. Pixel conversions compose these with a viewport origin
//! (see [`crate::core::viewport::Viewport`]).

use std::f64::consts::PI;

use crate::core::constants::MAX_ZOOM;
use crate::core::geo::{LatLng, Point, TileCoord};
use crate::{MapError, Result};

/// Tiles along one axis at `zoom`
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1_u64 << zoom
}

/// Total tiles in the grid at `zoom` (4^zoom)
pub fn tile_count(zoom: u8) -> u64 {
    tiles_per_axis(zoom) * tiles_per_axis(zoom)
}

/// Fractional tile coordinate of a geographic point.
///
/// Latitude is clamped and longitude wrapped before projecting, so the
/// result always lies in `[0, 2^zoom)` horizontally.
pub fn degree_to_tile(point: &LatLng, zoom: u8) -> Point {
    let point = point.normalize();
    let n = tiles_per_axis(zoom) as f64;
    let lat_rad = point.lat.to_radians();

    let x = (point.lng + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    Point::new(x, y)
}

/// Geographic point at a fractional tile coordinate, normalized
pub fn tile_to_degree(x: f64, y: f64, zoom: u8) -> LatLng {
    LatLng::normalized(row_to_lat(y, zoom), column_to_lng(x, zoom))
}

/// Longitude of a fractional column, without wrapping
pub fn column_to_lng(x: f64, zoom: u8) -> f64 {
    x / tiles_per_axis(zoom) as f64 * 360.0 - 180.0
}

/// Latitude of a fractional row, without clamping
pub fn row_to_lat(y: f64, zoom: u8) -> f64 {
    let n = tiles_per_axis(zoom) as f64;
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Resolves an integer tile address onto the grid.
///
/// Columns wrap around the antimeridian; rows outside the grid are rejected
/// since latitude is not cyclic.
pub fn wrap_tile(column: i64, row: i64, zoom: u8) -> Result<TileCoord> {
    if zoom > MAX_ZOOM {
        return Err(MapError::InvalidCoordinate(format!(
            "zoom {} exceeds maximum {}",
            zoom, MAX_ZOOM
        )));
    }
    let n = tiles_per_axis(zoom) as i64;
    if row < 0 || row >= n {
        return Err(MapError::InvalidCoordinate(format!(
            "row {} is outside [0, {}) at zoom {}",
            row, n, zoom
        )));
    }
    TileCoord::new(column.rem_euclid(n) as u32, row as u32, zoom)
}
