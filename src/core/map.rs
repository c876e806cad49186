use std::sync::Arc;
use std::time::Duration;

use crate::{
    core::{
        config::MapConfig,
        geo::{LatLng, LatLngBounds, Point, TileCoord},
        projection,
        viewport::{TileRange, Viewport},
    },
    data::geojson::{self, GeoJson, IngestOptions, IngestReport},
    input::{EventQueue, InputEvent, InteractionState, MapEvent, ViewportController},
    layers::{
        callbacks::{CallbackRegistry, CallbackTarget, ClickKind},
        feature::{Feature, FeatureId},
        layer::Layer,
        manager::LayerManager,
    },
    prelude::HashMap,
    runtime::AsyncSpawner,
    spatial::hit_test::resolve_click,
    tiles::{TileCache, TileFetcher, TileLoader, TileLookup, TileUpdate, UrlTemplateSource},
    Result,
};

/// One tile slot of the visible grid
///
/// `column`/`row` are the unwrapped grid position (columns may run past the
/// antimeridian), `coord` the wrapped key it was loaded under.
#[derive(Debug, Clone)]
pub struct TilePlacement {
    pub coord: TileCoord,
    pub column: i64,
    pub row: i64,
    /// Canvas position of the tile's top-left corner
    pub pixel: Point,
    pub lookup: TileLookup,
}

/// A click that landed on a feature
#[derive(Debug, Clone)]
pub struct ClickResult {
    pub layer: String,
    pub slot: usize,
    pub feature: Feature,
    /// Which callback handled it, if any
    pub target: CallbackTarget,
}

/// The map engine: viewport, layers, click callbacks and tile loading
///
/// A GUI adapter forwards [`InputEvent`]s, draws the [`TilePlacement`]s from
/// [`Map::request_visible_tiles`] and the features from
/// [`Map::visible_features`], and calls [`Map::poll_tiles`] once per frame.
#[derive(Debug)]
pub struct Map {
    config: MapConfig,
    controller: ViewportController,
    layers: LayerManager,
    callbacks: CallbackRegistry,
    tiles: TileLoader,
    events: EventQueue,
    hovered: Option<Hovered>,
}

/// Feature under the pointer, kept whole so leave callbacks still get it
#[derive(Debug, Clone)]
struct Hovered {
    layer: String,
    feature: Feature,
}

impl Map {
    /// Creates a map; `viewport` takes its tile size and zoom limits from `config`
    pub fn new(
        viewport: Viewport,
        config: MapConfig,
        fetcher: Arc<dyn TileFetcher>,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> Result<Self> {
        config.validate()?;
        let viewport = viewport
            .with_tile_size(config.tile_size)
            .with_zoom_limits(config.min_zoom, config.max_zoom);
        let source = Arc::new(UrlTemplateSource::from_config(&config));
        let tiles = TileLoader::new(&config.tile_loading, source, fetcher, spawner);

        log::debug!(
            "map created at {:?} z{} ({}x{})",
            viewport.center(),
            viewport.zoom(),
            viewport.width(),
            viewport.height()
        );

        Ok(Self {
            config,
            controller: ViewportController::new(viewport),
            layers: LayerManager::new(),
            callbacks: CallbackRegistry::new(),
            tiles,
            events: EventQueue::default(),
            hovered: None,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        self.controller.viewport()
    }

    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    /// Gesture toggles (wheel zoom, double-click zoom, drag panning)
    pub fn controller_mut(&mut self) -> &mut ViewportController {
        &mut self.controller
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.controller.state()
    }

    pub fn center(&self) -> LatLng {
        self.viewport().center()
    }

    pub fn zoom(&self) -> u8 {
        self.viewport().zoom()
    }

    /// Drains the events emitted since the last call, oldest first.
    ///
    /// Call once per frame: the queue keeps at most
    /// [`MAX_QUEUED_EVENTS`](crate::constants::MAX_QUEUED_EVENTS) and drops
    /// the oldest beyond that.
    pub fn take_events(&mut self) -> Vec<MapEvent> {
        self.collect_events();
        self.events.drain()
    }

    fn collect_events(&mut self) {
        let pending = self.controller.take_events();
        self.events.extend(pending);
    }

    /// Bookkeeping after a controller call
    fn after_view_change(&mut self, changed: bool) -> bool {
        self.collect_events();
        if changed {
            let range = self.visible_tile_range();
            self.tiles.retain_interest(&range);
        }
        changed
    }

    // --- viewport -----------------------------------------------------------------------------

    pub fn set_center(&mut self, center: LatLng) -> bool {
        let changed = self.controller.set_center(center);
        self.after_view_change(changed)
    }

    pub fn set_zoom(&mut self, zoom: i32) -> bool {
        let changed = self.controller.set_zoom(zoom);
        self.after_view_change(changed)
    }

    pub fn set_view(&mut self, center: LatLng, zoom: i32) -> bool {
        let changed = self.controller.set_view(center, zoom);
        self.after_view_change(changed)
    }

    /// Moves the view by `delta` pixels; positive x pans east
    pub fn pan_by(&mut self, delta: Point) -> bool {
        let changed = self.controller.pan_by(delta);
        self.after_view_change(changed)
    }

    /// Zooms by whole levels, keeping the location under `anchor` in place
    pub fn zoom_by(&mut self, delta: i32, anchor: Option<Point>) -> bool {
        let changed = self.controller.zoom_by(delta, anchor);
        self.after_view_change(changed)
    }

    pub fn drag_start(&mut self, position: Point) {
        self.controller.drag_start(position);
        self.collect_events();
    }

    pub fn drag_move(&mut self, position: Point) -> bool {
        let changed = self.controller.drag_move(position);
        self.after_view_change(changed)
    }

    pub fn drag_end(&mut self) {
        self.controller.drag_end();
        self.collect_events();
    }

    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let changed = self.controller.resize(width, height);
        self.after_view_change(changed)
    }

    /// Applies a GUI event. Returns true when the view changed.
    ///
    /// Clicks are hit-tested and dispatched to callbacks. A double click on
    /// a feature with a double-click callback does not zoom.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::Click { position, button } => {
                self.controller.handle_event(event);
                self.collect_events();
                if let Some(kind) = ClickKind::from_button(button) {
                    self.handle_click_with(position, kind);
                }
                false
            }
            InputEvent::PointerMove { position } => {
                self.pointer_move(position);
                false
            }
            InputEvent::PointerLeave => {
                self.pointer_leave();
                false
            }
            InputEvent::DoubleClick { position } => {
                let handled = self
                    .handle_click_with(position, ClickKind::Double)
                    .map_or(false, |click| click.target != CallbackTarget::None);
                if handled {
                    return false;
                }
                let changed = self.controller.handle_event(event);
                self.after_view_change(changed)
            }
            _ => {
                let changed = self.controller.handle_event(event);
                self.after_view_change(changed)
            }
        }
    }

    pub fn visible_bounds(&self) -> LatLngBounds {
        self.controller.visible_bounds()
    }

    /// Tiles for the current zoom, widened by the configured prefetch margin
    pub fn visible_tile_range(&self) -> TileRange {
        self.controller
            .visible_tile_range(self.zoom(), self.config.tile_loading.prefetch_margin)
    }

    pub fn project_lat_lng_to_pixel(&self, lat_lng: &LatLng) -> Point {
        self.viewport().lat_lng_to_pixel(lat_lng)
    }

    pub fn pixel_to_lat_lng(&self, pixel: &Point) -> LatLng {
        self.viewport().pixel_to_lat_lng(pixel)
    }

    // --- layers -------------------------------------------------------------------------------

    /// Adds a layer on top; names must be unique
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        let name = layer.name().to_string();
        self.layers.add_layer(layer)?;
        self.events.push(MapEvent::LayerAdd { layer: name });
        Ok(())
    }

    /// Removes a layer together with its default click callbacks
    pub fn remove_layer(&mut self, name: &str) -> Option<Layer> {
        let layer = self.layers.remove_layer(name)?;
        self.callbacks.remove_layer(name);
        if self.hovered.as_ref().is_some_and(|h| h.layer == name) {
            self.hovered = None;
        }
        self.events.push(MapEvent::LayerRemove {
            layer: name.to_string(),
        });
        Some(layer)
    }

    pub fn layers(&self) -> &LayerManager {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerManager {
        &mut self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get_layer(name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.get_layer_mut(name)
    }

    /// Features of visible layers overlapping the canvas, bottom layer first
    pub fn visible_features(&self) -> Vec<(&Layer, Vec<&Feature>)> {
        let bounds = self.visible_bounds();
        self.layers
            .layers_in_draw_order()
            .filter(|layer| layer.is_visible())
            .map(|layer| (layer, layer.features_in_bounds(&bounds)))
            .filter(|(_, features)| !features.is_empty())
            .collect()
    }

    /// Distributes GeoJSON features into the point and shape layers
    pub fn load_geojson(
        &mut self,
        geojson: &GeoJson,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let before = self.layers.list_layers();
        let report = geojson::ingest(geojson, &mut self.layers, options)?;
        for name in self.layers.list_layers() {
            if !before.contains(&name) {
                self.events.push(MapEvent::LayerAdd { layer: name });
            }
        }
        Ok(report)
    }

    // --- clicks -------------------------------------------------------------------------------

    /// Primary-button callback for every part of the feature with this id
    pub fn on_feature_click<F>(&mut self, id: impl Into<FeatureId>, callback: F)
    where
        F: Fn(&Feature) + Send + Sync + 'static,
    {
        self.callbacks.on_feature(id, ClickKind::Primary, callback);
    }

    /// Primary-button default callback for a layer's features
    pub fn on_layer_click<F>(&mut self, layer: impl Into<String>, callback: F)
    where
        F: Fn(&Feature) + Send + Sync + 'static,
    {
        self.callbacks.on_layer(layer, ClickKind::Primary, callback);
    }

    /// Registry for callbacks on other buttons, double clicks and hover
    pub fn callbacks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    /// Resolves a primary click at a canvas pixel
    pub fn handle_click(&mut self, position: Point) -> Option<ClickResult> {
        self.handle_click_with(position, ClickKind::Primary)
    }

    /// Resolves a click and invokes the feature's callback, else the
    /// layer's. The match is returned even when no callback is registered.
    pub fn handle_click_with(&mut self, position: Point, kind: ClickKind) -> Option<ClickResult> {
        let hit = resolve_click(&self.layers, self.controller.viewport(), position)?;
        let target = self.callbacks.dispatch(hit.layer.name(), hit.feature, kind);
        log::debug!(
            "{:?} click at {:?} hit {} in '{}' ({:?})",
            kind,
            position,
            hit.feature.id,
            hit.layer.name(),
            target
        );

        let result = ClickResult {
            layer: hit.layer.name().to_string(),
            slot: hit.slot,
            feature: hit.feature.clone(),
            target,
        };
        self.events.push(MapEvent::FeatureClick {
            layer: result.layer.clone(),
            feature_id: result.feature.id.clone(),
        });
        Some(result)
    }

    // --- hover --------------------------------------------------------------------------------

    /// Tracks the feature under the pointer.
    ///
    /// When it changes, the previous feature gets its `Leave` callback and
    /// the new one its `Enter` callback, in that order.
    pub fn pointer_move(&mut self, position: Point) {
        let hit = resolve_click(&self.layers, self.controller.viewport(), position);
        let unchanged = match (&self.hovered, &hit) {
            (Some(current), Some(hit)) => {
                current.layer == hit.layer.name()
                    && current.feature.id == hit.feature.id
                    && current.feature.part == hit.feature.part
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        let next = hit.map(|hit| Hovered {
            layer: hit.layer.name().to_string(),
            feature: hit.feature.clone(),
        });
        self.pointer_leave();
        if let Some(entered) = &next {
            self.callbacks
                .dispatch(&entered.layer, &entered.feature, ClickKind::Enter);
            self.events.push(MapEvent::FeatureEnter {
                layer: entered.layer.clone(),
                feature_id: entered.feature.id.clone(),
            });
        }
        self.hovered = next;
    }

    /// The pointer left the canvas; fires `Leave` for the hovered feature
    pub fn pointer_leave(&mut self) {
        let Some(left) = self.hovered.take() else {
            return;
        };
        self.callbacks
            .dispatch(&left.layer, &left.feature, ClickKind::Leave);
        self.events.push(MapEvent::FeatureLeave {
            layer: left.layer,
            feature_id: left.feature.id,
        });
    }

    /// Layer name and feature currently under the pointer
    pub fn hovered_feature(&self) -> Option<(&str, &Feature)> {
        self.hovered
            .as_ref()
            .map(|h| (h.layer.as_str(), &h.feature))
    }

    // --- tiles --------------------------------------------------------------------------------

    /// Requests every tile of the visible range, nearest the center first.
    ///
    /// Missing tiles are fetched in that order; interest is narrowed to the
    /// range so off-screen fetches are no longer awaited.
    pub fn request_visible_tiles(&mut self) -> Vec<TilePlacement> {
        let range = self.visible_tile_range();
        self.tiles.retain_interest(&range);

        let viewport = self.controller.viewport();
        let center = viewport.center_tile();
        let origin = viewport.origin_tile();
        let tile_size = viewport.tile_size() as f64;

        let mut cells: Vec<(i64, i64)> = range.cells().collect();
        cells.sort_by(|a, b| {
            let da = cell_distance(*a, &center);
            let db = cell_distance(*b, &center);
            da.total_cmp(&db).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0))
        });

        let mut lookups: HashMap<TileCoord, TileLookup> = HashMap::default();
        let mut placements = Vec::with_capacity(cells.len());
        for (column, row) in cells {
            let coord = match projection::wrap_tile(column, row, range.zoom) {
                Ok(coord) => coord,
                Err(err) => {
                    log::error!("visible range produced an invalid tile: {}", err);
                    continue;
                }
            };
            let lookup = match lookups.get(&coord) {
                Some(lookup) => lookup.clone(),
                None => {
                    let lookup = self.tiles.request(coord);
                    lookups.insert(coord, lookup.clone());
                    lookup
                }
            };
            let pixel = Point::new(column as f64, row as f64)
                .subtract(&origin)
                .multiply(tile_size);
            placements.push(TilePlacement {
                coord,
                column,
                row,
                pixel,
                lookup,
            });
        }
        placements
    }

    /// Applies finished tile fetches; repaint when this returns `Ready` updates
    pub fn poll_tiles(&mut self) -> Vec<TileUpdate> {
        let updates = self.tiles.poll();
        log_failures(&updates);
        updates
    }

    /// Like [`Map::poll_tiles`] but waits up to `timeout` for the first result
    pub fn poll_tiles_blocking(&mut self, timeout: Duration) -> Vec<TileUpdate> {
        let updates = self.tiles.poll_blocking(timeout);
        log_failures(&updates);
        updates
    }

    pub fn tile_cache(&self) -> &TileCache {
        self.tiles.cache()
    }

    pub fn pending_tiles(&self) -> usize {
        self.tiles.pending()
    }
}

fn cell_distance((column, row): (i64, i64), center: &Point) -> f64 {
    let dx = column as f64 + 0.5 - center.x;
    let dy = row as f64 + 0.5 - center.y;
    dx * dx + dy * dy
}

fn log_failures(updates: &[TileUpdate]) {
    for update in updates {
        if let TileUpdate::Failed(err) = update {
            log::warn!("{}", err);
        }
    }
}
