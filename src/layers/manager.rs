use crate::{layers::layer::Layer, MapError, Result};

use crate::prelude::HashMap;

/// Manages layers for the map, handling draw order
///
/// Layers are drawn in insertion order unless reordered explicitly; the last
/// layer is topmost.
#[derive(Debug)]
pub struct LayerManager {
    /// All layers indexed by name
    layers: HashMap<String, Layer>,
    /// Layer names bottom to top
    render_order: Vec<String>,
}

impl LayerManager {
    pub fn new() -> Self {
        Self {
            layers: HashMap::default(),
            render_order: Vec::new(),
        }
    }

    /// Adds a layer on top of the others
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        let position = self.render_order.len();
        self.insert_layer(position, layer)
    }

    /// Adds a layer at a draw position (0 = bottom), clamped to the stack
    pub fn insert_layer(&mut self, position: usize, layer: Layer) -> Result<()> {
        let name = layer.name().to_string();
        if self.layers.contains_key(&name) {
            return Err(MapError::Layer(format!("layer '{}' already exists", name)));
        }
        let position = position.min(self.render_order.len());
        self.layers.insert(name.clone(), layer);
        self.render_order.insert(position, name);
        Ok(())
    }

    /// Removes a layer from the manager
    pub fn remove_layer(&mut self, name: &str) -> Option<Layer> {
        self.render_order.retain(|id| id != name);
        self.layers.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Gets a reference to a layer by name
    pub fn get_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn get_layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.get_mut(name)
    }

    /// Applies a function to a specific layer mutably
    pub fn with_layer_mut<F, R>(&mut self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Layer) -> R,
    {
        self.layers.get_mut(name).map(f)
    }

    /// Layer names bottom to top
    pub fn list_layers(&self) -> Vec<String> {
        self.render_order.clone()
    }

    /// Layers bottom first; `.rev()` walks them topmost first
    pub fn layers_in_draw_order(&self) -> impl DoubleEndedIterator<Item = &Layer> + '_ {
        self.render_order
            .iter()
            .filter_map(|id| self.layers.get(id))
    }

    /// Gets all layers in draw order, bottom first
    pub fn layers(&self) -> Vec<&Layer> {
        self.layers_in_draw_order().collect()
    }

    /// Moves a layer to a draw position (0 = bottom), clamped to the stack
    pub fn move_layer(&mut self, name: &str, position: usize) -> Result<()> {
        let current = self
            .render_order
            .iter()
            .position(|id| id == name)
            .ok_or_else(|| MapError::Layer(format!("no layer named '{}'", name)))?;
        let id = self.render_order.remove(current);
        let position = position.min(self.render_order.len());
        self.render_order.insert(position, id);
        Ok(())
    }

    /// Gets the number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Checks if the manager is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Default for LayerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(manager: &LayerManager) -> Vec<&str> {
        manager.layers().iter().map(|l| l.name()).collect()
    }

    #[test]
    fn test_insertion_order_is_draw_order() {
        let mut manager = LayerManager::new();
        manager.add_layer(Layer::new("base")).unwrap();
        manager.add_layer(Layer::new("roads")).unwrap();
        manager.insert_layer(0, Layer::new("water")).unwrap();
        assert_eq!(names(&manager), vec!["water", "base", "roads"]);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut manager = LayerManager::new();
        manager.add_layer(Layer::new("points")).unwrap();
        assert!(matches!(
            manager.add_layer(Layer::new("points")),
            Err(MapError::Layer(_))
        ));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_move_and_remove() {
        let mut manager = LayerManager::new();
        for name in ["a", "b", "c"] {
            manager.add_layer(Layer::new(name)).unwrap();
        }
        manager.move_layer("a", 99).unwrap();
        assert_eq!(names(&manager), vec!["b", "c", "a"]);
        assert!(manager.move_layer("missing", 0).is_err());

        assert!(manager.remove_layer("c").is_some());
        assert!(manager.remove_layer("c").is_none());
        assert_eq!(manager.list_layers(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_with_layer_mut() {
        let mut manager = LayerManager::new();
        manager.add_layer(Layer::new("a")).unwrap();
        let hidden = manager.with_layer_mut("a", |layer| {
            layer.set_visible(false);
            layer.is_visible()
        });
        assert_eq!(hidden, Some(false));
        assert!(!manager.get_layer("a").unwrap().is_visible());
    }
}
