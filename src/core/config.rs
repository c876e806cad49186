//! Configuration for the map engine
//!
//! Every field has a documented default, so a partial JSON document (or none
//! at all) yields a usable configuration. Tile loading can also be picked
//! from a small set of presets through [`TileLoadingProfile`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::constants::*;
use crate::{MapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoadingProfile {
    Balanced,
    LowResource,
    HighPerformance,
}

impl TileLoadingProfile {
    pub fn resolve(&self) -> TileLoadingConfig {
        match self {
            Self::Balanced => TileLoadingConfig::default(),
            Self::LowResource => TileLoadingConfig {
                cache_size: 64,
                prefetch_margin: 0,
                max_retries: 2,
                retry_delay_ms: 250,
                exponential_backoff: false,
                retained_ranges: 1,
                ..TileLoadingConfig::default()
            },
            Self::HighPerformance => TileLoadingConfig {
                cache_size: 1024,
                prefetch_margin: 2,
                max_retries: 5,
                retry_delay_ms: 1000,
                max_retry_delay_ms: 30_000,
                retained_ranges: 16,
                ..TileLoadingConfig::default()
            },
        }
    }
}

impl Default for TileLoadingProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Tile fetching and caching behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Maximum number of tiles held in memory. Default 256.
    pub cache_size: usize,
    /// Tile rings requested around the canvas. Default 1.
    pub prefetch_margin: u32,
    /// Retries after the first failed fetch. Default 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default 500 ms.
    pub retry_delay_ms: u64,
    /// Cap for a single backoff step. Default 8 s.
    pub max_retry_delay_ms: u64,
    /// Double the delay on every retry. Default true.
    pub exponential_backoff: bool,
    /// How long a given-up tile stays a persistent miss. Default 60 s.
    pub failure_ttl_ms: u64,
    /// Recent visible ranges whose tiles are kept when pruning. Default 4.
    pub retained_ranges: usize,
    /// Network timeout per tile request. Default 10 s.
    pub request_timeout_ms: u64,
    /// User agent for tile requests.
    pub user_agent: String,
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_CAPACITY,
            prefetch_margin: DEFAULT_PREFETCH_MARGIN,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            exponential_backoff: true,
            failure_ttl_ms: DEFAULT_FAILURE_TTL_MS,
            retained_ranges: DEFAULT_RETAINED_RANGES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TileLoadingConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> std::time::Duration {
        let delay_ms = if self.exponential_backoff {
            let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
            self.retry_delay_ms.saturating_mul(factor)
        } else {
            self.retry_delay_ms
        };
        std::time::Duration::from_millis(delay_ms.min(self.max_retry_delay_ms))
    }
}

/// Top level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Tile URL template with `{z}`, `{x}`, `{y}` and optional `{s}`.
    pub provider_url: String,
    /// Values substituted for `{s}`, rotated per tile.
    pub subdomains: Vec<String>,
    /// Tile edge in pixels. Default 256.
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_loading: TileLoadingConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_TILE_URL.to_string(),
            subdomains: Vec::new(),
            tile_size: TILE_SIZE,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            tile_loading: TileLoadingConfig::default(),
        }
    }
}

impl MapConfig {
    pub fn with_profile(mut self, profile: TileLoadingProfile) -> Self {
        self.tile_loading = profile.resolve();
        self
    }

    /// Parses and validates a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_zoom > MAX_ZOOM {
            return Err(MapError::Config(format!(
                "max_zoom {} exceeds {}",
                self.max_zoom, MAX_ZOOM
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(MapError::Config(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.tile_size == 0 {
            return Err(MapError::Config("tile_size must be positive".into()));
        }
        if self.tile_loading.cache_size == 0 {
            return Err(MapError::Config("cache_size must be positive".into()));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.provider_url.contains(placeholder) {
                return Err(MapError::Config(format!(
                    "provider_url is missing {}",
                    placeholder
                )));
            }
        }
        if self.provider_url.contains("{s}") && self.subdomains.is_empty() {
            return Err(MapError::Config(
                "provider_url uses {s} but no subdomains are configured".into(),
            ));
        }
        Ok(())
    }
}
