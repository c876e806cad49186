use rstar::{RTree, RTreeObject, AABB};

use crate::core::geo::LatLngBounds;
use crate::layers::feature::Feature;

/// Envelope of one stored feature, keyed by its slot in the layer
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFeature {
    pub slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl IndexedFeature {
    /// Envelope in `[lng, lat]` order; `None` for a feature without coordinates
    pub fn new(slot: usize, feature: &Feature) -> Option<Self> {
        let bounds = feature.bounds()?;
        Some(Self {
            slot,
            envelope: envelope_of(&bounds),
        })
    }
}

// --- rstar integration -------------------------------------------------------------------------

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of(bounds: &LatLngBounds) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bounds.south_west.lng, bounds.south_west.lat],
        [bounds.north_east.lng, bounds.north_east.lat],
    )
}

/// R-tree over feature envelopes, used for culling and hit-test candidates
///
/// Only narrows the search; ordering always comes from the layer's slots.
#[derive(Debug)]
pub struct FeatureIndex {
    rtree: RTree<IndexedFeature>,
}

impl Default for FeatureIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self {
            rtree: RTree::new(),
        }
    }

    /// Rebuilds from scratch, slot = position in `features`
    pub fn rebuild(&mut self, features: &[Feature]) {
        let items = features
            .iter()
            .enumerate()
            .filter_map(|(slot, feature)| IndexedFeature::new(slot, feature))
            .collect();
        self.rtree = RTree::bulk_load(items);
    }

    pub fn insert(&mut self, slot: usize, feature: &Feature) {
        if let Some(item) = IndexedFeature::new(slot, feature) {
            self.rtree.insert(item);
        }
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.rtree = RTree::new();
    }

    /// Slots whose envelope intersects `bounds`, ascending.
    ///
    /// Bounds running past ±180° longitude also match features on the other
    /// side of the antimeridian.
    pub fn query(&self, bounds: &LatLngBounds) -> Vec<usize> {
        let west = bounds.south_west.lng;
        let east = bounds.north_east.lng;
        let (south, north) = (bounds.south_west.lat, bounds.north_east.lat);

        let mut windows = vec![(west, east)];
        if east - west < 360.0 {
            if west < -180.0 {
                windows.push((west + 360.0, 180.0));
            }
            if east > 180.0 {
                windows.push((-180.0, east - 360.0));
            }
        }

        let mut slots: Vec<usize> = windows
            .into_iter()
            .flat_map(|(w, e)| {
                let envelope = AABB::from_corners([w, south], [e, north]);
                self.rtree
                    .locate_in_envelope_intersecting(&envelope)
                    .map(|item| item.slot)
                    .collect::<Vec<_>>()
            })
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_returns_sorted_slots() {
        let features = vec![
            Feature::point("a", 10.0, 10.0),
            Feature::point("b", 50.0, 50.0),
            Feature::point("c", 11.0, 11.0),
        ];
        let mut index = FeatureIndex::new();
        index.rebuild(&features);
        assert_eq!(index.len(), 3);

        let hits = index.query(&LatLngBounds::from_coords(9.0, 9.0, 12.0, 12.0));
        assert_eq!(hits, vec![0, 2]);
    }

    #[test]
    fn test_query_across_antimeridian() {
        let mut index = FeatureIndex::new();
        index.insert(0, &Feature::point("east", 0.0, 179.5));
        index.insert(1, &Feature::point("west", 0.0, -179.5));

        // View spanning 179°E to 181°E (= 179°W)
        let hits = index.query(&LatLngBounds::from_coords(-1.0, 179.0, 1.0, 181.0));
        assert_eq!(hits, vec![0, 1]);
    }
}
