pub mod cache;
pub mod fetcher;
pub mod loader;
pub mod source;

// Re-exports for convenience
pub use cache::{CacheStats, TileCache, TileLookup};
pub use fetcher::{FetchError, HttpTileFetcher, TileFetcher, TileImage};
pub use loader::{TileLoader, TileUpdate};
pub use source::{TileSource, UrlTemplateSource};
