use serde_json::Value;

use crate::core::geo::LatLngBounds;
use crate::layers::feature::{Feature, FeatureId, GeometryKind};
use crate::layers::style::value_to_label;
use crate::spatial::index::FeatureIndex;
use crate::Result;

/// Selects features for removal; unset criteria match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFilter {
    pub id: Option<FeatureId>,
    /// Matches either the stored kind or the kind before flattening
    pub kind: Option<GeometryKind>,
    /// Every listed property must be present with an equal value
    pub properties: Vec<(String, Value)>,
}

impl FeatureFilter {
    pub fn by_id(id: impl Into<FeatureId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_kind(kind: GeometryKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.push((key.into(), value));
        self
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        if let Some(id) = &self.id {
            if &feature.id != id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if feature.kind() != kind && feature.source_kind != kind {
                return false;
            }
        }
        self.properties
            .iter()
            .all(|(key, value)| feature.property(key) == Some(value))
    }
}

/// Named, ordered collection of features
///
/// Insertion order is draw order: later features are drawn on top and win
/// hit tests.
#[derive(Debug)]
pub struct Layer {
    name: String,
    features: Vec<Feature>,
    visible: bool,
    label_key: Option<String>,
    index: FeatureIndex,
    max_radius: f64,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
            visible: true,
            label_key: None,
            index: FeatureIndex::new(),
            max_radius: 0.0,
        }
    }

    /// Property whose value is used as label text
    pub fn with_label_key(mut self, key: impl Into<String>) -> Self {
        self.label_key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn label_key(&self) -> Option<&str> {
        self.label_key.as_deref()
    }

    pub fn set_label_key(&mut self, key: Option<String>) {
        self.label_key = key;
    }

    /// Stored features in draw order
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, slot: usize) -> Option<&Feature> {
        self.features.get(slot)
    }

    /// Stored entries; a flattened multi-geometry counts once per part
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Largest point radius in the layer, the slack needed around a click
    pub fn max_point_radius(&self) -> f64 {
        self.max_radius
    }

    /// Appends a feature on top, splitting multi-geometries.
    ///
    /// Returns the number of entries stored.
    pub fn add_feature(&mut self, feature: Feature) -> Result<usize> {
        feature.geometry.validate()?;
        let parts = feature.flatten();
        let count = parts.len();
        for part in parts {
            let slot = self.features.len();
            self.max_radius = self.max_radius.max(part.style.radius);
            self.index.insert(slot, &part);
            self.features.push(part);
        }
        Ok(count)
    }

    /// All entries sharing an id (several for a flattened multi-geometry)
    pub fn features_by_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Feature> + 'a {
        self.features.iter().filter(move |f| f.id == id)
    }

    /// Removes matching features, returning how many entries went
    pub fn remove_features(&mut self, filter: &FeatureFilter) -> usize {
        let before = self.features.len();
        self.features.retain(|feature| !filter.matches(feature));
        let removed = before - self.features.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    pub fn clear_features(&mut self) {
        self.features.clear();
        self.index.clear();
        self.max_radius = 0.0;
    }

    fn reindex(&mut self) {
        self.index.rebuild(&self.features);
        self.max_radius = self
            .features
            .iter()
            .map(|f| f.style.radius)
            .fold(0.0, f64::max);
    }

    /// Slots whose envelope touches `bounds`, in draw order
    pub fn slots_in_bounds(&self, bounds: &LatLngBounds) -> Vec<usize> {
        self.index.query(bounds)
    }

    /// Features whose envelope touches `bounds`, in draw order
    pub fn features_in_bounds(&self, bounds: &LatLngBounds) -> Vec<&Feature> {
        self.slots_in_bounds(bounds)
            .into_iter()
            .filter_map(|slot| self.features.get(slot))
            .collect()
    }

    /// Label for a feature: the layer's label property, else the style label
    pub fn label_text(&self, feature: &Feature) -> Option<String> {
        self.label_key
            .as_deref()
            .and_then(|key| feature.property(key))
            .and_then(value_to_label)
            .or_else(|| feature.style.label.clone())
    }
}
