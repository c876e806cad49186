use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::geo::{LatLng, LatLngBounds};
use crate::layers::style::FeatureStyle;
use crate::prelude::HashMap;
use crate::{MapError, Result};

pub type FeatureId = String;

/// Geometry kinds a feature can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    pub fn is_point_like(&self) -> bool {
        matches!(self, GeometryKind::Point | GeometryKind::MultiPoint)
    }

    pub fn is_polygon_like(&self) -> bool {
        matches!(self, GeometryKind::Polygon | GeometryKind::MultiPolygon)
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        };
        f.write_str(name)
    }
}

/// Feature geometry in WGS84 degrees
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Point(LatLng),
    MultiPoint(Vec<LatLng>),
    LineString(Vec<LatLng>),
    /// Ring 0 is the outer boundary, the rest are holes
    Polygon(Vec<Vec<LatLng>>),
    MultiPolygon(Vec<Vec<Vec<LatLng>>>),
}

impl FeatureGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            FeatureGeometry::Point(_) => GeometryKind::Point,
            FeatureGeometry::MultiPoint(_) => GeometryKind::MultiPoint,
            FeatureGeometry::LineString(_) => GeometryKind::LineString,
            FeatureGeometry::Polygon(_) => GeometryKind::Polygon,
            FeatureGeometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Every coordinate of the geometry
    pub fn coordinates(&self) -> Box<dyn Iterator<Item = &LatLng> + '_> {
        match self {
            FeatureGeometry::Point(p) => Box::new(std::iter::once(p)),
            FeatureGeometry::MultiPoint(points) | FeatureGeometry::LineString(points) => {
                Box::new(points.iter())
            }
            FeatureGeometry::Polygon(rings) => Box::new(rings.iter().flatten()),
            FeatureGeometry::MultiPolygon(polygons) => {
                Box::new(polygons.iter().flatten().flatten())
            }
        }
    }

    /// Bounds where the geometry is drawn: latitudes past the Mercator
    /// limit are clamped to it, as the projection does.
    pub fn bounds(&self) -> Option<LatLngBounds> {
        let mut bounds = match self {
            // Holes lie inside the outer ring
            FeatureGeometry::Polygon(rings) => LatLngBounds::from_points(rings.first()?.iter()),
            _ => LatLngBounds::from_points(self.coordinates()),
        }?;
        bounds.south_west.lat = LatLng::clamp_lat(bounds.south_west.lat);
        bounds.north_east.lat = LatLng::clamp_lat(bounds.north_east.lat);
        Some(bounds)
    }

    /// Rejects geometries that cannot be drawn or picked
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.coordinates().find(|p| !p.is_valid()) {
            return Err(MapError::InvalidCoordinate(format!(
                "({}, {}) is not a WGS84 coordinate",
                bad.lat, bad.lng
            )));
        }
        match self {
            FeatureGeometry::Point(_) => Ok(()),
            FeatureGeometry::MultiPoint(points) if points.is_empty() => {
                Err(MapError::UnsupportedGeometry("empty MultiPoint".into()))
            }
            FeatureGeometry::MultiPoint(_) => Ok(()),
            FeatureGeometry::LineString(points) if points.len() < 2 => Err(
                MapError::UnsupportedGeometry("LineString needs at least two points".into()),
            ),
            FeatureGeometry::LineString(_) => Ok(()),
            FeatureGeometry::Polygon(rings) => validate_rings(rings),
            FeatureGeometry::MultiPolygon(polygons) if polygons.is_empty() => {
                Err(MapError::UnsupportedGeometry("empty MultiPolygon".into()))
            }
            FeatureGeometry::MultiPolygon(polygons) => {
                polygons.iter().try_for_each(|rings| validate_rings(rings))
            }
        }
    }
}

fn validate_rings(rings: &[Vec<LatLng>]) -> Result<()> {
    if rings.is_empty() {
        return Err(MapError::UnsupportedGeometry("polygon without rings".into()));
    }
    for ring in rings {
        // A closed triangle has four positions, an open one three
        if ring.len() < 3 {
            return Err(MapError::UnsupportedGeometry(format!(
                "polygon ring with {} positions",
                ring.len()
            )));
        }
    }
    Ok(())
}

/// A geographic feature owned by a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: FeatureGeometry,
    pub properties: HashMap<String, Value>,
    pub style: FeatureStyle,
    /// Geometry kind before multi-geometries were split
    pub source_kind: GeometryKind,
    /// Position within the parent multi-geometry
    pub part: Option<usize>,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>, geometry: FeatureGeometry) -> Self {
        let source_kind = geometry.kind();
        Self {
            id: id.into(),
            geometry,
            properties: HashMap::default(),
            style: FeatureStyle::default(),
            source_kind,
            part: None,
        }
    }

    pub fn point(id: impl Into<FeatureId>, lat: f64, lng: f64) -> Self {
        Self::new(id, FeatureGeometry::Point(LatLng::new(lat, lng)))
    }

    /// Sets the properties and derives the style from them
    pub fn with_properties(mut self, properties: HashMap<String, Value>) -> Self {
        self.style = FeatureStyle::from_properties(&properties);
        self.properties = properties;
        self
    }

    /// Overrides the derived style
    pub fn with_style(mut self, style: FeatureStyle) -> Self {
        self.style = style;
        self
    }

    pub fn kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.geometry.bounds()
    }

    /// Splits multi-geometries into single-part features sharing id,
    /// properties and style. Single geometries are returned unchanged.
    pub fn flatten(self) -> Vec<Feature> {
        let Feature {
            id,
            geometry,
            properties,
            style,
            source_kind,
            part: _,
        } = self;

        let parts: Vec<FeatureGeometry> = match geometry {
            FeatureGeometry::MultiPoint(points) => {
                points.into_iter().map(FeatureGeometry::Point).collect()
            }
            FeatureGeometry::MultiPolygon(polygons) => {
                polygons.into_iter().map(FeatureGeometry::Polygon).collect()
            }
            single => {
                return vec![Feature {
                    id,
                    geometry: single,
                    properties,
                    style,
                    source_kind,
                    part: None,
                }]
            }
        };

        parts
            .into_iter()
            .enumerate()
            .map(|(index, geometry)| Feature {
                id: id.clone(),
                geometry,
                properties: properties.clone(),
                style: style.clone(),
                source_kind,
                part: Some(index),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::MAX_LATITUDE;
    use serde_json::json;

    fn square(lat: f64, lng: f64, size: f64) -> Vec<LatLng> {
        vec![
            LatLng::new(lat, lng),
            LatLng::new(lat, lng + size),
            LatLng::new(lat + size, lng + size),
            LatLng::new(lat + size, lng),
            LatLng::new(lat, lng),
        ]
    }

    #[test]
    fn test_multipolygon_flattens_into_parts() {
        let properties: HashMap<String, Value> =
            serde_json::from_value(json!({ "name": "islands", "fill": "#00ff00" })).unwrap();
        let feature = Feature::new(
            "archipelago",
            FeatureGeometry::MultiPolygon(vec![vec![square(0.0, 0.0, 1.0)], vec![square(5.0, 5.0, 1.0)]]),
        )
        .with_properties(properties);

        let parts = feature.flatten();
        assert_eq!(parts.len(), 2);
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.id, "archipelago");
            assert_eq!(part.kind(), GeometryKind::Polygon);
            assert_eq!(part.source_kind, GeometryKind::MultiPolygon);
            assert_eq!(part.part, Some(index));
            assert_eq!(part.property("name"), Some(&json!("islands")));
            assert_eq!(part.style, parts[0].style);
        }
    }

    #[test]
    fn test_single_geometry_is_not_split() {
        let parts = Feature::point("p", 1.0, 2.0).flatten();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part, None);
    }

    #[test]
    fn test_polygon_bounds_ignore_holes() {
        let geometry = FeatureGeometry::Polygon(vec![square(0.0, 0.0, 4.0), square(1.0, 1.0, 1.0)]);
        let bounds = geometry.bounds().unwrap();
        assert_eq!(bounds.to_tuple(), (0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn test_polar_bounds_clamped_to_mercator_limit() {
        let bounds = FeatureGeometry::Point(LatLng::new(89.0, 0.0)).bounds().unwrap();
        assert_eq!(bounds.north_east.lat, MAX_LATITUDE);
        assert_eq!(bounds.south_west.lat, MAX_LATITUDE);

        let south = FeatureGeometry::MultiPoint(vec![LatLng::new(-90.0, 1.0), LatLng::new(10.0, 2.0)])
            .bounds()
            .unwrap();
        assert_eq!(south.to_tuple(), (-MAX_LATITUDE, 1.0, 10.0, 2.0));
    }

    #[test]
    fn test_validation() {
        assert!(FeatureGeometry::Point(LatLng::new(10.0, 10.0)).validate().is_ok());
        assert!(matches!(
            FeatureGeometry::Point(LatLng::new(95.0, 10.0)).validate(),
            Err(MapError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            FeatureGeometry::Polygon(vec![vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)]])
                .validate(),
            Err(MapError::UnsupportedGeometry(_))
        ));
        assert!(FeatureGeometry::MultiPoint(vec![]).validate().is_err());
        assert!(FeatureGeometry::Polygon(vec![square(0.0, 0.0, 1.0)]).validate().is_ok());
    }
}
