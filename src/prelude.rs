//! Prelude module for common slippymap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use slippymap::prelude::*;`

pub use crate::core::{
    builder::MapBuilder,
    config::{MapConfig, TileLoadingConfig, TileLoadingProfile},
    geo::{LatLng, LatLngBounds, Point, TileCoord},
    map::{ClickResult, Map, TilePlacement},
    projection::{degree_to_tile, tile_count, tile_to_degree, wrap_tile},
    viewport::{TileRange, Viewport},
};

pub use crate::layers::{
    callbacks::{CallbackRegistry, ClickKind},
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

pub use crate::data::geojson::{GeoJson, GeoJsonFeature, GeoJsonGeometry, IngestOptions, IngestReport};

pub use crate::runtime::{AsyncHandle, AsyncSpawner, InlineSpawner, ThreadSpawner};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioSpawner;

pub use crate::{Error as MapError, Result};

pub use std::{sync::Arc, time::Duration};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
