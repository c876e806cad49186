use std::collections::VecDeque;

use crate::core::constants::MAX_QUEUED_EVENTS;
use crate::core::geo::{LatLng, Point};
use serde::{Deserialize, Serialize};

/// Input events forwarded by the embedding GUI, in canvas pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Single click/tap
    Click {
        position: Point,
        button: MouseButton,
    },
    /// Double click/tap
    DoubleClick { position: Point },
    /// Start of drag operation
    DragStart { position: Point },
    /// Pointer moved while dragging (absolute position)
    Drag { position: Point },
    /// End of drag operation
    DragEnd,
    /// Scroll wheel; positive delta zooms in
    Scroll { delta: f64, position: Point },
    /// Canvas resize
    Resize { width: u32, height: u32 },
    /// Pointer moved without a drag (hover)
    PointerMove { position: Point },
    /// Pointer left the canvas
    PointerLeave,
}

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Map event types emitted by the controller and the map
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// Center, zoom or canvas size changed
    ViewChanged { center: LatLng, zoom: u8 },
    /// Click on the map, hit or not
    Click { lat_lng: LatLng, pixel: Point },
    /// A click resolved to a feature
    FeatureClick { layer: String, feature_id: String },
    /// The pointer moved onto a feature
    FeatureEnter { layer: String, feature_id: String },
    /// The pointer moved off a feature
    FeatureLeave { layer: String, feature_id: String },
    ZoomStart { zoom: u8 },
    ZoomEnd { zoom: u8 },
    MoveStart { center: LatLng },
    MoveEnd { center: LatLng },
    LayerAdd { layer: String },
    LayerRemove { layer: String },
}

impl InputEvent {
    /// Gets the primary position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            InputEvent::Click { position, .. }
            | InputEvent::DoubleClick { position }
            | InputEvent::DragStart { position }
            | InputEvent::Drag { position }
            | InputEvent::Scroll { position, .. }
            | InputEvent::PointerMove { position } => Some(*position),
            InputEvent::DragEnd | InputEvent::Resize { .. } | InputEvent::PointerLeave => None,
        }
    }
}

/// FIFO of [`MapEvent`]s waiting for the embedder.
///
/// Bounded: once full, each new event drops the oldest one.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: VecDeque<MapEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: MapEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
            if self.dropped == 1 {
                log::debug!("event queue full at {}; dropping oldest events", self.capacity);
            }
        }
        self.events.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = MapEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Removes and returns every queued event, oldest first
    pub fn drain(&mut self) -> Vec<MapEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to the capacity bound so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(MAX_QUEUED_EVENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queue_drops_oldest_when_full() {
        let mut queue = EventQueue::with_capacity(2);
        for zoom in 1..=3 {
            queue.push(MapEvent::ZoomEnd { zoom });
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(
            queue.drain(),
            vec![MapEvent::ZoomEnd { zoom: 2 }, MapEvent::ZoomEnd { zoom: 3 }]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_input_event_position() {
        let click = InputEvent::Click {
            position: Point::new(100.0, 200.0),
            button: MouseButton::Left,
        };
        assert_eq!(click.position(), Some(Point::new(100.0, 200.0)));
        assert_eq!(InputEvent::DragEnd.position(), None);
        assert_eq!(
            InputEvent::Resize {
                width: 10,
                height: 10
            }
            .position(),
            None
        );
    }
}
