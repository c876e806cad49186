use async_trait::async_trait;
use image::ImageFormat;
use once_cell::sync::Lazy;
use std::time::Duration;

use crate::core::config::TileLoadingConfig;
use crate::core::constants::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_USER_AGENT};
use crate::core::geo::TileCoord;

/// Shared async HTTP client. Public tile servers reject requests without a
/// user agent, and building the client once keeps one connection pool.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .timeout(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Why a single tile fetch failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("payload is not an image: {0}")]
    InvalidImage(String),

    #[error("fetch task did not run: {0}")]
    Runtime(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Raster payload of one tile, immutable once cached
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    pub coord: TileCoord,
    pub data: Vec<u8>,
    /// Sniffed from the payload's magic bytes
    pub format: Option<ImageFormat>,
}

impl TileImage {
    pub fn new(coord: TileCoord, data: Vec<u8>) -> Self {
        let format = image::guess_format(&data).ok();
        Self {
            coord,
            data,
            format,
        }
    }

    /// Like [`TileImage::new`] but rejects payloads that are not a known image format
    pub fn decode_checked(coord: TileCoord, data: Vec<u8>) -> Result<Self, FetchError> {
        let format =
            image::guess_format(&data).map_err(|e| FetchError::InvalidImage(e.to_string()))?;
        Ok(Self {
            coord,
            data,
            format: Some(format),
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fetches the raster for one tile
///
/// Implementations must not block the caller's thread; they are driven by
/// the loader's [`crate::runtime::AsyncSpawner`].
#[async_trait]
pub trait TileFetcher: Send + Sync + 'static {
    async fn fetch(&self, coord: TileCoord, url: String) -> Result<TileImage, FetchError>;
}

/// HTTP fetcher backed by reqwest. Needs a tokio runtime to drive its I/O.
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
}

impl HttpTileFetcher {
    /// Fetcher with its own client configured from `config`
    pub fn new(config: &TileLoadingConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| FetchError::Runtime(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetcher using the process-wide client with default settings
    pub fn shared() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }

    /// Shares the process-wide client unless `config` changes its settings
    pub fn for_config(config: &TileLoadingConfig) -> Result<Self, FetchError> {
        if config.user_agent == DEFAULT_USER_AGENT
            && config.request_timeout_ms == DEFAULT_REQUEST_TIMEOUT_MS
        {
            Ok(Self::shared())
        } else {
            Self::new(config)
        }
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, coord: TileCoord, url: String) -> Result<TileImage, FetchError> {
        log::debug!("fetching tile {} from {}", coord, url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        TileImage::decode_checked(coord, bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_png_payload_is_recognized() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let image = TileImage::decode_checked(coord, PNG_MAGIC.to_vec()).unwrap();
        assert_eq!(image.format, Some(ImageFormat::Png));
        assert_eq!(image.len(), PNG_MAGIC.len());
    }

    #[test]
    fn test_html_payload_is_rejected() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let err = TileImage::decode_checked(coord, b"<html>rate limited</html>".to_vec());
        assert!(matches!(err, Err(FetchError::InvalidImage(_))));
        assert_eq!(TileImage::new(coord, b"<html>".to_vec()).format, None);
    }

    #[test]
    fn test_client_builds_from_config() {
        let mut config = TileLoadingConfig::default();
        assert!(HttpTileFetcher::for_config(&config).is_ok());
        config.request_timeout_ms = 2_000;
        assert!(HttpTileFetcher::for_config(&config).is_ok());
    }
}
