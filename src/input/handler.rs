use crate::{
    core::{
        geo::{LatLng, LatLngBounds, Point},
        projection,
        viewport::{TileRange, Viewport},
    },
    input::events::{EventQueue, InputEvent, MapEvent},
};

/// Gesture state of the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionState {
    Idle,
    /// A drag is active; `last` is the previous pointer position
    Panning { last: Point },
    /// A zoom is being committed; `from` is the zoom before the change
    Zooming { from: u8 },
}

/// Owns the viewport and applies pan/zoom gestures to it
///
/// State changes are reported as [`MapEvent`]s, collected until
/// [`ViewportController::take_events`] is called. The queue is bounded, so
/// events not drained in time are lost oldest first.
#[derive(Debug, Clone)]
pub struct ViewportController {
    viewport: Viewport,
    state: InteractionState,
    events: EventQueue,

    pub zoom_on_wheel: bool,
    pub zoom_on_double_click: bool,
    pub pan_on_drag: bool,
}

impl ViewportController {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            state: InteractionState::Idle,
            events: EventQueue::default(),
            zoom_on_wheel: true,
            zoom_on_double_click: true,
            pan_on_drag: true,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Drains the events emitted since the last call
    pub fn take_events(&mut self) -> Vec<MapEvent> {
        self.events.drain()
    }

    fn emit(&mut self, event: MapEvent) {
        self.events.push(event);
    }

    fn emit_view_changed(&mut self) {
        let event = MapEvent::ViewChanged {
            center: self.viewport.center(),
            zoom: self.viewport.zoom(),
        };
        self.emit(event);
    }

    /// Dispatches a GUI event. Returns true when the view changed.
    pub fn handle_event(&mut self, event: &InputEvent) -> bool {
        match *event {
            InputEvent::Click { position, .. } => {
                let lat_lng = self.viewport.pixel_to_lat_lng(&position);
                self.emit(MapEvent::Click {
                    lat_lng,
                    pixel: position,
                });
                false
            }
            InputEvent::DoubleClick { position } => {
                self.zoom_on_double_click && self.zoom_by(1, Some(position))
            }
            InputEvent::DragStart { position } => {
                self.drag_start(position);
                false
            }
            InputEvent::Drag { position } => self.drag_move(position),
            InputEvent::DragEnd => {
                self.drag_end();
                false
            }
            InputEvent::Scroll { delta, position } => {
                if !self.zoom_on_wheel || delta == 0.0 {
                    return false;
                }
                let step = if delta > 0.0 { 1 } else { -1 };
                self.zoom_by(step, Some(position))
            }
            InputEvent::Resize { width, height } => self.resize(width, height),
            // Hover is resolved against layers by the map
            InputEvent::PointerMove { .. } | InputEvent::PointerLeave => false,
        }
    }

    /// Idle -> Panning
    pub fn drag_start(&mut self, position: Point) {
        if !self.pan_on_drag {
            return;
        }
        if !matches!(self.state, InteractionState::Panning { .. }) {
            let center = self.viewport.center();
            self.emit(MapEvent::MoveStart { center });
        }
        self.state = InteractionState::Panning { last: position };
    }

    /// Moves the content with the pointer while panning
    pub fn drag_move(&mut self, position: Point) -> bool {
        let InteractionState::Panning { last } = self.state else {
            log::debug!("drag move at {:?} ignored outside a drag", position);
            return false;
        };
        self.state = InteractionState::Panning { last: position };
        self.pan_by(last.subtract(&position))
    }

    /// Panning -> Idle
    pub fn drag_end(&mut self) {
        if matches!(self.state, InteractionState::Panning { .. }) {
            self.state = InteractionState::Idle;
            let center = self.viewport.center();
            self.emit(MapEvent::MoveEnd { center });
        }
    }

    /// Moves the view by `delta` pixels; positive x pans east, positive y south
    pub fn pan_by(&mut self, delta: Point) -> bool {
        if delta.x == 0.0 && delta.y == 0.0 {
            return false;
        }
        let zoom = self.viewport.zoom();
        let shift = delta.multiply(1.0 / self.viewport.tile_size() as f64);
        let tile = self.viewport.center_tile().add(&shift);

        self.viewport
            .set_center(projection::tile_to_degree(tile.x, tile.y, zoom));
        self.emit_view_changed();
        true
    }

    /// Changes zoom keeping the location under `anchor` fixed on screen.
    ///
    /// `anchor` defaults to the canvas center. Requests are clamped to the
    /// zoom limits; a request that clamps to the current zoom is a no-op.
    pub fn zoom_to(&mut self, zoom: i32, anchor: Option<Point>) -> bool {
        let from = self.viewport.zoom();
        let target = self.viewport.clamp_zoom(zoom);
        if target == from {
            return false;
        }

        let resume = self.state;
        self.state = InteractionState::Zooming { from };
        self.emit(MapEvent::ZoomStart { zoom: from });

        let half = self.viewport.size().multiply(0.5);
        let anchor = anchor.unwrap_or(half);
        let pinned = self.viewport.pixel_to_lat_lng(&anchor);

        self.viewport.set_zoom(target as i32);
        let offset = anchor
            .subtract(&half)
            .multiply(1.0 / self.viewport.tile_size() as f64);
        let center = projection::degree_to_tile(&pinned, target).subtract(&offset);
        self.viewport
            .set_center(projection::tile_to_degree(center.x, center.y, target));

        self.state = match resume {
            InteractionState::Panning { .. } => resume,
            _ => InteractionState::Idle,
        };
        self.emit(MapEvent::ZoomEnd { zoom: target });
        self.emit_view_changed();
        true
    }

    pub fn zoom_by(&mut self, delta: i32, anchor: Option<Point>) -> bool {
        let zoom = self.viewport.zoom() as i32 + delta;
        self.zoom_to(zoom, anchor)
    }

    pub fn set_center(&mut self, center: LatLng) -> bool {
        let before = self.viewport.center();
        self.viewport.set_center(center);
        if self.viewport.center() == before {
            return false;
        }
        self.emit_view_changed();
        true
    }

    /// Sets the zoom around the current center
    pub fn set_zoom(&mut self, zoom: i32) -> bool {
        self.zoom_to(zoom, None)
    }

    pub fn set_view(&mut self, center: LatLng, zoom: i32) -> bool {
        let zoomed = self.set_zoom(zoom);
        self.set_center(center) || zoomed
    }

    pub fn set_zoom_limits(&mut self, min_zoom: u8, max_zoom: u8) -> bool {
        let before = self.viewport.zoom();
        self.viewport.set_zoom_limits(min_zoom, max_zoom);
        if self.viewport.zoom() == before {
            return false;
        }
        self.emit_view_changed();
        true
    }

    /// Canvas resize, sizes clamped to at least one pixel
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.viewport.width() == width.max(1) && self.viewport.height() == height.max(1) {
            return false;
        }
        self.viewport.set_size(width, height);
        self.emit_view_changed();
        true
    }

    pub fn visible_bounds(&self) -> LatLngBounds {
        self.viewport.bounds()
    }

    pub fn visible_tile_range(&self, zoom: u8, margin: u32) -> TileRange {
        self.viewport.tile_range(zoom, margin)
    }
}
