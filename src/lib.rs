//! # slippymap
//!
//! A headless, Rust-native slippy-map engine.
//!
//! The crate covers the non-visual core of an interactive tile map: Web
//! Mercator projection, tile addressing and caching with deduplicated,
//! retried asynchronous fetches, viewport state with pan/zoom gestures, a
//! layered feature store, and click hit-testing. Drawing and event loops
//! belong to the embedding GUI, which consumes [`TilePlacement`]s and
//! projected features and forwards [`InputEvent`]s.

pub mod core;
pub mod data;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    builder::MapBuilder,
    config::{MapConfig, TileLoadingConfig, TileLoadingProfile},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    map::{ClickResult, Map, TilePlacement},
    viewport::{TileRange, Viewport},
};

pub use crate::layers::{
    callbacks::{CallbackTarget, ClickKind},
    feature::{Feature, FeatureGeometry, FeatureId, GeometryKind},
    layer::{FeatureFilter, Layer},
    manager::LayerManager,
    style::{Color, FeatureStyle},
};

pub use crate::input::{
    events::{InputEvent, MapEvent, MouseButton},
    handler::{InteractionState, ViewportController},
};

pub use crate::tiles::{
    cache::{TileCache, TileLookup},
    fetcher::{FetchError, HttpTileFetcher, TileFetcher, TileImage},
    loader::{TileLoader, TileUpdate},
    source::{TileSource, UrlTemplateSource},
};

pub use crate::spatial::hit_test::{resolve_click, Hit};

pub use crate::data::geojson::{GeoJson, IngestOptions, IngestReport};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Tile {coord} fetch failed: {source}")]
    TileFetchFailure {
        coord: TileCoord,
        #[source]
        source: FetchError,
    },

    #[error("Tile {0} unavailable after repeated failures")]
    PersistentMiss(TileCoord),

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Tile cache holds {len} entries but capacity is {capacity}")]
    CacheCapacityViolation { len: usize, capacity: usize },

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type alias for convenience
pub type Error = MapError;
