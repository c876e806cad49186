//! slippymap CLI
//!
//! Builds a headless map from a config file and optional GeoJSON, then prints
//! what a GUI would see: the visible bounds, the tile range and, for a given
//! canvas pixel, the feature a click there would resolve to.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use slippymap::runtime::TokioSpawner;
use slippymap::{
    GeoJson, IngestOptions, LatLng, Map, MapBuilder, MapConfig, Point, TileLoadingProfile,
    TileLookup, TileSource, TileUpdate, UrlTemplateSource,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Profile {
    /// Small cache, no prefetch ring
    LowResource,
    Balanced,
    /// Large cache, wide prefetch ring
    HighPerformance,
}

impl From<Profile> for TileLoadingProfile {
    fn from(profile: Profile) -> Self {
        match profile {
            Profile::LowResource => TileLoadingProfile::LowResource,
            Profile::Balanced => TileLoadingProfile::Balanced,
            Profile::HighPerformance => TileLoadingProfile::HighPerformance,
        }
    }
}

#[derive(Parser)]
#[command(name = "slippymap")]
#[command(about = "Inspect a slippy-map viewport: bounds, tiles and click picking", long_about = None)]
struct Args {
    /// Map configuration JSON (tile URL, zoom limits, tile loading)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tile loading profile, applied over the configuration file
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// GeoJSON document to load into the point and shape layers
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// Property used as the feature label
    #[arg(long)]
    label_key: Option<String>,

    /// Center latitude in decimal degrees
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    lat: f64,

    /// Center longitude in decimal degrees
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    lon: f64,

    #[arg(long, default_value = "2")]
    zoom: u8,

    /// Canvas width in pixels
    #[arg(long, default_value = "800")]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value = "600")]
    height: u32,

    /// Canvas pixel to resolve a click at
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    click: Option<Vec<f64>>,

    /// Print the URL of every visible tile
    #[arg(long)]
    urls: bool,

    /// Download the visible tiles and report the cache outcome
    #[arg(long)]
    fetch: bool,

    /// Seconds to wait for tile downloads
    #[arg(long, default_value = "10")]
    timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    let mut config = match &args.config {
        Some(path) => MapConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => MapConfig::default(),
    };
    if let Some(profile) = args.profile {
        config = config.with_profile(profile.into());
    }

    let mut map = MapBuilder::new()
        .with_config(config)
        .with_center_and_zoom(LatLng::new(args.lat, args.lon), args.zoom)
        .with_size(args.width, args.height)
        .with_spawner(Arc::new(TokioSpawner::new(runtime.handle().clone())))
        .build()
        .context("building map")?;

    if let Some(path) = &args.geojson {
        load_features(&mut map, path, args.label_key.clone())?;
    }

    print_view(&map, args.urls);

    if let Some(click) = &args.click {
        if let [x, y] = click.as_slice() {
            print_click(&mut map, Point::new(*x, *y));
        }
    }

    if args.fetch {
        fetch_visible(&mut map, Duration::from_secs(args.timeout));
    }

    Ok(())
}

fn load_features(map: &mut Map, path: &Path, label_key: Option<String>) -> Result<()> {
    let geojson = GeoJson::from_json_file(path)
        .with_context(|| format!("reading GeoJSON {}", path.display()))?;
    let options = IngestOptions {
        label_key,
        ..IngestOptions::default()
    };
    let report = map.load_geojson(&geojson, &options)?;

    println!("GeoJSON: {}", path.display());
    println!("  Points: {}", report.points);
    println!("  Shapes: {}", report.shapes);
    for skipped in &report.skipped {
        println!(
            "  Skipped #{} ({}): {}",
            skipped.index, skipped.id, skipped.error
        );
    }
    println!();
    Ok(())
}

fn print_view(map: &Map, with_urls: bool) {
    let viewport = map.viewport();
    let center = map.center();
    let bounds = map.visible_bounds();

    println!("Viewport:");
    println!("  Center: {:.6}, {:.6}", center.lat, center.lng);
    println!("  Zoom: {}", map.zoom());
    println!("  Canvas: {}x{}", viewport.width(), viewport.height());
    println!(
        "  Bounds: south={:.6} west={:.6} north={:.6} east={:.6}",
        bounds.south_west.lat, bounds.south_west.lng, bounds.north_east.lat, bounds.north_east.lng
    );
    println!();

    let range = viewport.tile_range(viewport.zoom(), 0);
    let keys = range.keys();
    println!("Tile range (z={}):", range.zoom);
    println!("  Columns: {}..={}", range.min_x, range.max_x);
    println!("  Rows: {}..={}", range.min_y, range.max_y);
    println!("  Distinct tiles: {}", keys.len());
    if with_urls {
        let source = UrlTemplateSource::from_config(map.config());
        for key in &keys {
            println!("  {} {}", key, source.url(*key));
        }
    }
    println!();

    for (layer, features) in map.visible_features() {
        println!("Layer {}: {} visible feature(s)", layer.name(), features.len());
    }
}

fn print_click(map: &mut Map, pixel: Point) {
    let position = map.pixel_to_lat_lng(&pixel);
    println!(
        "Click at ({}, {}) -> {:.6}, {:.6}",
        pixel.x, pixel.y, position.lat, position.lng
    );

    match map.handle_click(pixel) {
        Some(result) => {
            println!("  Layer: {}", result.layer);
            println!("  Feature: {} (slot {})", result.feature.id, result.slot);
            if let Some(part) = result.feature.part {
                println!("  Part: {}", part);
            }
            if let Some(label) = map
                .layer(&result.layer)
                .and_then(|layer| layer.label_text(&result.feature))
            {
                println!("  Label: {}", label);
            }
        }
        None => println!("  No feature"),
    }
}

fn fetch_visible(map: &mut Map, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let mut placements = map.request_visible_tiles();
    println!("Fetching {} tile slot(s)...", placements.len());

    let (mut ready, mut failed) = (0, 0);
    loop {
        let waiting = placements
            .iter()
            .filter(|p| matches!(p.lookup, TileLookup::Pending | TileLookup::Miss))
            .count();
        if waiting == 0 {
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::warn!("{} tile slot(s) still pending after {:?}", waiting, timeout);
            break;
        }
        let wait = remaining.min(Duration::from_millis(250));
        if map.pending_tiles() == 0 {
            // Only retries waiting out their backoff remain
            std::thread::sleep(wait);
        }
        for update in map.poll_tiles_blocking(wait) {
            match update {
                TileUpdate::Ready(_) => ready += 1,
                TileUpdate::Failed(_) => failed += 1,
            }
        }
        // Keys whose backoff has elapsed are fetched again here
        placements = map.request_visible_tiles();
    }

    let missing = placements
        .iter()
        .filter(|p| matches!(p.lookup, TileLookup::PersistentMiss))
        .count();
    let stats = map.tile_cache().stats();

    println!("  Ready: {}", ready);
    println!("  Failed attempts: {}", failed);
    println!("  Unavailable: {}", missing);
    println!(
        "  Cache: {} tile(s), hits={} misses={} evictions={}",
        map.tile_cache().len(),
        stats.hits,
        stats.misses,
        stats.evictions
    );
}
