use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_LATITUDE, MAX_ZOOM, MIN_ZOOM, TILE_SIZE};
use crate::core::geo::{LatLng, LatLngBounds, Point, TileCoord};
use crate::core::projection;

/// The current view of the map: center, zoom, and canvas dimensions
///
/// Derived values (bounds, tile ranges, pixel positions) are recomputed on
/// every call. Mutation goes through [`crate::input::ViewportController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    center: LatLng,
    zoom: u8,
    width: u32,
    height: u32,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: u32,
}

impl Viewport {
    /// Creates a new viewport with the full zoom range and 256px tiles
    pub fn new(center: LatLng, zoom: u8, width: u32, height: u32) -> Self {
        Self {
            center: center.normalize(),
            zoom: zoom.min(MAX_ZOOM),
            width: width.max(1),
            height: height.max(1),
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            tile_size: TILE_SIZE,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_zoom_limits(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.set_zoom_limits(min_zoom, max_zoom);
        self
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Canvas size in pixels
    pub fn size(&self) -> Point {
        Point::new(self.width as f64, self.height as f64)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Clamps an arbitrary zoom request into the allowed range
    pub fn clamp_zoom(&self, zoom: i32) -> u8 {
        zoom.clamp(self.min_zoom as i32, self.max_zoom as i32) as u8
    }

    pub(crate) fn set_center(&mut self, center: LatLng) {
        self.center = center.normalize();
    }

    pub(crate) fn set_zoom(&mut self, zoom: i32) {
        self.zoom = self.clamp_zoom(zoom);
    }

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub(crate) fn set_zoom_limits(&mut self, min_zoom: u8, max_zoom: u8) {
        let max_zoom = max_zoom.min(MAX_ZOOM);
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
    }

    /// Fractional tile coordinate of the center at the current zoom
    pub fn center_tile(&self) -> Point {
        projection::degree_to_tile(&self.center, self.zoom)
    }

    /// Fractional tile coordinate of the canvas' top-left corner
    pub fn origin_tile(&self) -> Point {
        let half = self.size().multiply(0.5 / self.tile_size as f64);
        self.center_tile().subtract(&half)
    }

    /// Converts a geographical coordinate to canvas pixel coordinates.
    ///
    /// Longitudes are placed on the world copy nearest to the view center,
    /// so points just across the antimeridian stay next to the view.
    pub fn lat_lng_to_pixel(&self, lat_lng: &LatLng) -> Point {
        let n = projection::tiles_per_axis(self.zoom) as f64;
        let center = self.center_tile();
        let mut tile = projection::degree_to_tile(lat_lng, self.zoom);

        if tile.x - center.x > n / 2.0 {
            tile.x -= n;
        } else if center.x - tile.x > n / 2.0 {
            tile.x += n;
        }

        tile.subtract(&self.origin_tile())
            .multiply(self.tile_size as f64)
    }

    /// Converts canvas pixel coordinates to a (normalized) geographical coordinate
    pub fn pixel_to_lat_lng(&self, pixel: &Point) -> LatLng {
        let tile = self.pixel_to_tile(pixel);
        projection::tile_to_degree(tile.x, tile.y, self.zoom)
    }

    /// Fractional tile coordinate under a canvas pixel
    pub fn pixel_to_tile(&self, pixel: &Point) -> Point {
        self.origin_tile()
            .add(&pixel.multiply(1.0 / self.tile_size as f64))
    }

    /// Geographic extent of the canvas.
    ///
    /// Latitudes are clamped to the Mercator limit. Longitudes are left
    /// unwrapped, so a view straddling the antimeridian may report an edge
    /// beyond ±180; a canvas wider than the world reports the full range.
    pub fn bounds(&self) -> LatLngBounds {
        let top_left = self.origin_tile();
        let bottom_right = self.pixel_to_tile(&self.size());

        let mut west = projection::column_to_lng(top_left.x, self.zoom);
        let mut east = projection::column_to_lng(bottom_right.x, self.zoom);
        if east - west >= 360.0 {
            west = -180.0;
            east = 180.0;
        }

        let north = projection::row_to_lat(top_left.y, self.zoom).min(MAX_LATITUDE);
        let south = projection::row_to_lat(bottom_right.y, self.zoom).max(-MAX_LATITUDE);

        LatLngBounds::from_coords(south, west, north, east)
    }

    /// Tiles covering the canvas at `zoom`, widened by `margin` rings
    pub fn tile_range(&self, zoom: u8, margin: u32) -> TileRange {
        let zoom = zoom.min(MAX_ZOOM);
        let center = projection::degree_to_tile(&self.center, zoom);
        let half = self.size().multiply(0.5 / self.tile_size as f64);
        let margin = margin as i64;
        let last_row = projection::tiles_per_axis(zoom) as i64 - 1;

        TileRange {
            zoom,
            min_x: (center.x - half.x).floor() as i64 - margin,
            max_x: (center.x + half.x).ceil() as i64 - 1 + margin,
            min_y: ((center.y - half.y).floor() as i64 - margin).max(0),
            max_y: ((center.y + half.y).ceil() as i64 - 1 + margin).min(last_row),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(LatLng::default(), 2, 800, 600)
    }
}

/// Rectangular block of tiles at a single zoom level
///
/// Columns are kept unwrapped (they may run past either edge of the grid)
/// so a renderer can place world copies side by side; [`TileRange::keys`]
/// folds them back onto the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl TileRange {
    pub fn width(&self) -> i64 {
        (self.max_x - self.min_x + 1).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.max_y - self.min_y + 1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Unwrapped `(column, row)` cells, row-major
    pub fn cells(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| (self.min_x..=self.max_x).map(move |x| (x, y)))
    }

    /// Distinct grid keys in the range, row-major
    pub fn keys(&self) -> Vec<TileCoord> {
        let mut seen = fxhash::FxHashSet::default();
        self.cells()
            .filter_map(|(x, y)| projection::wrap_tile(x, y, self.zoom).ok())
            .filter(|coord| seen.insert(*coord))
            .collect()
    }

    /// Whether a grid key falls in the range (wrap-aware)
    pub fn contains(&self, coord: &TileCoord) -> bool {
        if coord.z != self.zoom || self.is_empty() {
            return false;
        }
        let y = coord.y as i64;
        if y < self.min_y || y > self.max_y {
            return false;
        }
        let n = projection::tiles_per_axis(self.zoom) as i64;
        self.width() >= n || (coord.x as i64 - self.min_x).rem_euclid(n) < self.width()
    }
}
