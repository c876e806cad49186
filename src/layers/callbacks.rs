use fxhash::FxHashMap;

use crate::input::events::MouseButton;
use crate::layers::feature::{Feature, FeatureId};

/// Callback invoked with the feature under the pointer
pub type ClickCallback = Box<dyn Fn(&Feature) + Send + Sync>;

/// Which pointer interaction a callback listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickKind {
    Primary,
    Secondary,
    Middle,
    Double,
    /// The pointer moved onto the feature
    Enter,
    /// The pointer moved off the feature
    Leave,
}

impl ClickKind {
    pub fn from_button(button: MouseButton) -> Option<Self> {
        match button {
            MouseButton::Left => Some(ClickKind::Primary),
            MouseButton::Right => Some(ClickKind::Secondary),
            MouseButton::Middle => Some(ClickKind::Middle),
            MouseButton::Other(_) => None,
        }
    }
}

/// Who handled a click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTarget {
    Feature,
    /// The layer's default callback
    Layer,
    None,
}

/// Pointer callbacks keyed by feature id and by layer name
///
/// Features and layers only carry names; the functions live here so
/// features stay plain data.
#[derive(Default)]
pub struct CallbackRegistry {
    by_feature: FxHashMap<FeatureId, FxHashMap<ClickKind, ClickCallback>>,
    by_layer: FxHashMap<String, FxHashMap<ClickKind, ClickCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for every part of the feature with this id
    pub fn on_feature<F>(&mut self, id: impl Into<FeatureId>, kind: ClickKind, callback: F)
    where
        F: Fn(&Feature) + Send + Sync + 'static,
    {
        self.by_feature
            .entry(id.into())
            .or_default()
            .insert(kind, Box::new(callback));
    }

    /// Registers the default callback for features of a layer
    pub fn on_layer<F>(&mut self, layer: impl Into<String>, kind: ClickKind, callback: F)
    where
        F: Fn(&Feature) + Send + Sync + 'static,
    {
        self.by_layer
            .entry(layer.into())
            .or_default()
            .insert(kind, Box::new(callback));
    }

    pub fn remove_feature(&mut self, id: &str) {
        self.by_feature.remove(id);
    }

    pub fn remove_layer(&mut self, layer: &str) {
        self.by_layer.remove(layer);
    }

    pub fn len(&self) -> usize {
        self.by_feature.values().map(|kinds| kinds.len()).sum::<usize>()
            + self.by_layer.values().map(|kinds| kinds.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes the feature's own callback, else the layer default
    pub fn dispatch(&self, layer: &str, feature: &Feature, kind: ClickKind) -> CallbackTarget {
        let own = self
            .by_feature
            .get(feature.id.as_str())
            .and_then(|kinds| kinds.get(&kind));
        if let Some(callback) = own {
            callback(feature);
            return CallbackTarget::Feature;
        }
        let default = self.by_layer.get(layer).and_then(|kinds| kinds.get(&kind));
        if let Some(callback) = default {
            callback(feature);
            return CallbackTarget::Layer;
        }
        CallbackTarget::None
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("features", &self.by_feature.len())
            .field("layers", &self.by_layer.len())
            .field("callbacks", &self.len())
            .finish()
    }
}
