//! Core constants derived from common web-map conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Web Mercator latitude limit in degrees.
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Lowest zoom level of the tile grid (a single tile).
pub const MIN_ZOOM: u8 = 0;

/// Highest zoom level the tile grid supports.
pub const MAX_ZOOM: u8 = 19;

/// Default tile URL template (OpenStreetMap standard layer).
pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// User agent sent with tile requests. Public tile servers reject anonymous clients.
pub const DEFAULT_USER_AGENT: &str = concat!("slippymap/", env!("CARGO_PKG_VERSION"));

/// Number of decoded tiles kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Extra ring of tiles requested around the canvas.
pub const DEFAULT_PREFETCH_MARGIN: u32 = 1;

/// Fetch attempts after the first failure before a tile is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential retry backoff.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Upper bound for a single backoff step.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 8_000;

/// How long a given-up tile reports a persistent miss before it may be fetched again.
pub const DEFAULT_FAILURE_TTL_MS: u64 = 60_000;

/// Number of recently requested tile ranges whose tiles survive pruning.
pub const DEFAULT_RETAINED_RANGES: usize = 4;

/// Per-request network timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Point marker radius in pixels when a feature does not set one.
pub const DEFAULT_POINT_RADIUS: f64 = 4.0;

/// Layer names used by GeoJSON ingestion.
pub const DEFAULT_POINT_LAYER: &str = "points";
pub const DEFAULT_SHAPE_LAYER: &str = "polygons";

/// Events held for the embedder before the oldest are dropped.
pub const MAX_QUEUED_EVENTS: usize = 1024;
