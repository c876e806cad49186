//! Map builder for fluent API configuration
//!
//! Collects the initial view, the configuration, and the two injected
//! collaborators (tile fetcher and async spawner) before creating a [`Map`].

use std::sync::Arc;

use crate::{
    core::{
        config::{MapConfig, TileLoadingConfig, TileLoadingProfile},
        geo::LatLng,
        map::Map,
        viewport::Viewport,
    },
    runtime::{AsyncSpawner, ThreadSpawner},
    tiles::{HttpTileFetcher, TileFetcher},
    MapError, Result,
};

/// Builder for creating and configuring Map instances
pub struct MapBuilder {
    center: LatLng,
    zoom: u8,
    width: u32,
    height: u32,
    config: MapConfig,
    fetcher: Option<Arc<dyn TileFetcher>>,
    spawner: Option<Arc<dyn AsyncSpawner>>,
}

impl MapBuilder {
    /// Create a new MapBuilder with default settings
    pub fn new() -> Self {
        let viewport = Viewport::default();
        Self {
            center: viewport.center(),
            zoom: viewport.zoom(),
            width: viewport.width(),
            height: viewport.height(),
            config: MapConfig::default(),
            fetcher: None,
            spawner: None,
        }
    }

    pub fn with_center(mut self, center: LatLng) -> Self {
        self.center = center;
        self
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    /// Set the initial center and zoom level
    pub fn with_center_and_zoom(self, center: LatLng, zoom: u8) -> Self {
        self.with_center(center).with_zoom(zoom)
    }

    /// Canvas size in pixels
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Replaces the whole configuration
    pub fn with_config(mut self, config: MapConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tile loading profile
    pub fn with_profile(mut self, profile: TileLoadingProfile) -> Self {
        self.config = self.config.with_profile(profile);
        self
    }

    /// Configure tile loading behavior
    pub fn with_tile_config(mut self, config: TileLoadingConfig) -> Self {
        self.config.tile_loading = config;
        self
    }

    /// Tile URL template with `{z}`, `{x}`, `{y}` and optional `{s}`
    pub fn with_tile_url(mut self, template: impl Into<String>) -> Self {
        self.config.provider_url = template.into();
        self
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    /// Set zoom limits
    pub fn with_zoom_limits(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.config.min_zoom = min_zoom;
        self.config.max_zoom = max_zoom;
        self
    }

    /// Configure tile retry behavior
    pub fn with_tile_retries(
        mut self,
        max_retries: u32,
        delay_ms: u64,
        exponential_backoff: bool,
    ) -> Self {
        self.config.tile_loading.max_retries = max_retries;
        self.config.tile_loading.retry_delay_ms = delay_ms;
        self.config.tile_loading.exponential_backoff = exponential_backoff;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Build the map with the configured options.
    ///
    /// Without an explicit fetcher an [`HttpTileFetcher`] is used, which
    /// needs a tokio runtime: the spawner then defaults to the current tokio
    /// runtime and building fails outside one. A custom fetcher without a
    /// spawner runs on [`ThreadSpawner`].
    pub fn build(self) -> Result<Map> {
        self.config.validate()?;
        let viewport = Viewport::new(self.center, self.zoom, self.width, self.height);

        let (fetcher, spawner) = match (self.fetcher, self.spawner) {
            (Some(fetcher), Some(spawner)) => (fetcher, spawner),
            (Some(fetcher), None) => (fetcher, Arc::new(ThreadSpawner) as Arc<dyn AsyncSpawner>),
            (None, spawner) => {
                let http = HttpTileFetcher::for_config(&self.config.tile_loading)
                    .map_err(|e| MapError::Config(format!("HTTP client: {}", e)))?;
                let spawner = match spawner {
                    Some(spawner) => spawner,
                    None => default_http_spawner()?,
                };
                (Arc::new(http) as Arc<dyn TileFetcher>, spawner)
            }
        };

        Map::new(viewport, self.config, fetcher, spawner)
    }
}

#[cfg(feature = "tokio-runtime")]
fn default_http_spawner() -> Result<Arc<dyn AsyncSpawner>> {
    crate::runtime::TokioSpawner::current()
        .map(|spawner| Arc::new(spawner) as Arc<dyn AsyncSpawner>)
        .ok_or_else(|| {
            MapError::Config("HTTP tile fetching needs a tokio runtime or an explicit spawner".into())
        })
}

#[cfg(not(feature = "tokio-runtime"))]
fn default_http_spawner() -> Result<Arc<dyn AsyncSpawner>> {
    Err(MapError::Config(
        "HTTP tile fetching needs the tokio-runtime feature or an explicit spawner".into(),
    ))
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience methods for common map configurations
impl MapBuilder {
    /// OpenStreetMap tiles with balanced loading
    pub fn web_map(center: LatLng, zoom: u8, width: u32, height: u32) -> Self {
        Self::new()
            .with_center_and_zoom(center, zoom)
            .with_size(width, height)
            .with_profile(TileLoadingProfile::Balanced)
    }

    /// Small cache, no prefetch ring, few retries
    pub fn low_resource(center: LatLng, zoom: u8, width: u32, height: u32) -> Self {
        Self::web_map(center, zoom, width, height).with_profile(TileLoadingProfile::LowResource)
    }
}
