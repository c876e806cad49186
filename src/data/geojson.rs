use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constants::{DEFAULT_POINT_LAYER, DEFAULT_SHAPE_LAYER};
use crate::core::geo::{LatLng, LatLngBounds};
use crate::layers::feature::{Feature, FeatureGeometry, FeatureId};
use crate::layers::layer::Layer;
use crate::layers::manager::LayerManager;
use crate::prelude::HashMap;
use crate::{MapError, Result};

/// `[longitude, latitude, ...]`; extra members such as altitude are ignored
pub type Position = Vec<f64>;

/// GeoJSON geometry objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point {
        coordinates: Position,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJsonGeometry>,
    },
}

/// GeoJSON feature with geometry and properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    pub properties: Option<HashMap<String, Value>>,
}

/// Root GeoJSON object
#[derive(Debug, Clone, PartialEq)]
pub enum GeoJson {
    Feature(GeoJsonFeature),
    FeatureCollection { features: Vec<GeoJsonFeature> },
    Geometry(GeoJsonGeometry),
}

impl<'de> Deserialize<'de> for GeoJson {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        GeoJson::from_value(value).map_err(D::Error::custom)
    }
}

impl std::str::FromStr for GeoJson {
    type Err = MapError;

    fn from_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl GeoJson {
    /// Dispatches on the `type` member; anything else is read as a bare geometry
    pub fn from_value(mut value: Value) -> std::result::Result<Self, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("Feature") => Ok(GeoJson::Feature(serde_json::from_value(value)?)),
            Some("FeatureCollection") => {
                let features = value
                    .get_mut("features")
                    .map(Value::take)
                    .unwrap_or(Value::Array(Vec::new()));
                Ok(GeoJson::FeatureCollection {
                    features: serde_json::from_value(features)?,
                })
            }
            _ => Ok(GeoJson::Geometry(serde_json::from_value(value)?)),
        }
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Features in document order; a bare geometry becomes one feature
    pub fn features(&self) -> Vec<GeoJsonFeature> {
        match self {
            GeoJson::Feature(feature) => vec![feature.clone()],
            GeoJson::FeatureCollection { features } => features.clone(),
            GeoJson::Geometry(geometry) => vec![GeoJsonFeature {
                geometry: Some(geometry.clone()),
                ..GeoJsonFeature::default()
            }],
        }
    }

    /// Gets the bounding box of all features
    pub fn bounds(&self) -> Option<LatLngBounds> {
        let mut bounds: Option<LatLngBounds> = None;
        for feature in self.features() {
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            let points = geometry.to_lat_lng_points();
            if let Some(geom_bounds) = LatLngBounds::from_points(points.iter()) {
                match bounds {
                    Some(ref mut b) => {
                        b.extend(&geom_bounds.south_west);
                        b.extend(&geom_bounds.north_east);
                    }
                    None => bounds = Some(geom_bounds),
                }
            }
        }
        bounds
    }
}

fn position(coordinates: &[f64]) -> Result<LatLng> {
    match coordinates {
        [lng, lat, ..] => Ok(LatLng::new(*lat, *lng)),
        _ => Err(MapError::UnsupportedGeometry(format!(
            "position needs longitude and latitude, got {} values",
            coordinates.len()
        ))),
    }
}

fn positions(coordinates: &[Position]) -> Result<Vec<LatLng>> {
    coordinates.iter().map(|c| position(c)).collect()
}

fn rings(coordinates: &[Vec<Position>]) -> Result<Vec<Vec<LatLng>>> {
    coordinates.iter().map(|ring| positions(ring)).collect()
}

impl GeoJsonGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            GeoJsonGeometry::Point { .. } => "Point",
            GeoJsonGeometry::LineString { .. } => "LineString",
            GeoJsonGeometry::Polygon { .. } => "Polygon",
            GeoJsonGeometry::MultiPoint { .. } => "MultiPoint",
            GeoJsonGeometry::MultiLineString { .. } => "MultiLineString",
            GeoJsonGeometry::MultiPolygon { .. } => "MultiPolygon",
            GeoJsonGeometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Converts to an internal geometry, validating positions
    pub fn to_feature_geometry(&self) -> Result<FeatureGeometry> {
        let geometry = match self {
            GeoJsonGeometry::Point { coordinates } => FeatureGeometry::Point(position(coordinates)?),
            GeoJsonGeometry::MultiPoint { coordinates } => {
                FeatureGeometry::MultiPoint(positions(coordinates)?)
            }
            GeoJsonGeometry::LineString { coordinates } => {
                FeatureGeometry::LineString(positions(coordinates)?)
            }
            GeoJsonGeometry::Polygon { coordinates } => FeatureGeometry::Polygon(rings(coordinates)?),
            GeoJsonGeometry::MultiPolygon { coordinates } => FeatureGeometry::MultiPolygon(
                coordinates
                    .iter()
                    .map(|polygon| rings(polygon))
                    .collect::<Result<_>>()?,
            ),
            other => {
                return Err(MapError::UnsupportedGeometry(format!(
                    "{} is not supported",
                    other.type_name()
                )))
            }
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Every well-formed position, as LatLng
    pub fn to_lat_lng_points(&self) -> Vec<LatLng> {
        let flat: Vec<&Position> = match self {
            GeoJsonGeometry::Point { coordinates } => vec![coordinates],
            GeoJsonGeometry::LineString { coordinates }
            | GeoJsonGeometry::MultiPoint { coordinates } => coordinates.iter().collect(),
            GeoJsonGeometry::Polygon { coordinates }
            | GeoJsonGeometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().collect()
            }
            GeoJsonGeometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().collect()
            }
            GeoJsonGeometry::GeometryCollection { geometries } => {
                return geometries
                    .iter()
                    .flat_map(GeoJsonGeometry::to_lat_lng_points)
                    .collect()
            }
        };
        flat.into_iter().filter_map(|c| position(c).ok()).collect()
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GeoJsonFeature {
    /// GeoJSON `id`, else `properties.id`, else `feature-<index>`
    pub fn resolve_id(&self, index: usize) -> FeatureId {
        self.id
            .as_ref()
            .and_then(id_text)
            .or_else(|| {
                self.properties
                    .as_ref()
                    .and_then(|p| p.get("id"))
                    .and_then(id_text)
            })
            .unwrap_or_else(|| format!("feature-{}", index))
    }

    /// Converts to an internal feature with its style derived from properties
    pub fn to_feature(&self, index: usize) -> Result<Feature> {
        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| MapError::UnsupportedGeometry("feature without geometry".into()))?
            .to_feature_geometry()?;
        let properties = self.properties.clone().unwrap_or_default();
        Ok(Feature::new(self.resolve_id(index), geometry).with_properties(properties))
    }
}

/// Where ingested features go
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Layer receiving Point and MultiPoint features
    pub point_layer: String,
    /// Layer receiving Polygon and MultiPolygon features
    pub shape_layer: String,
    /// Label key applied to layers this call creates
    pub label_key: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            point_layer: DEFAULT_POINT_LAYER.to_string(),
            shape_layer: DEFAULT_SHAPE_LAYER.to_string(),
            label_key: None,
        }
    }
}

/// A feature left out of the layers
#[derive(Debug)]
pub struct SkippedFeature {
    /// Position in the document
    pub index: usize,
    pub id: FeatureId,
    pub error: MapError,
}

/// Outcome of [`ingest`]
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Source features stored in the point layer
    pub points: usize,
    /// Source features stored in the shape layer
    pub shapes: usize,
    pub skipped: Vec<SkippedFeature>,
}

impl IngestReport {
    pub fn added(&self) -> usize {
        self.points + self.shapes
    }
}

/// Distributes GeoJSON features into the point and shape layers.
///
/// Missing layers are created. A newly created shape layer is inserted
/// below the point layer rather than appended after it, so points draw on
/// top of shapes and are hit first. Unsupported or malformed features are
/// skipped and reported while the rest of the document is ingested.
pub fn ingest(
    geojson: &GeoJson,
    layers: &mut LayerManager,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut point_features = Vec::new();
    let mut shape_features = Vec::new();

    for (index, source) in geojson.features().iter().enumerate() {
        match source.to_feature(index) {
            Ok(feature) if feature.kind().is_point_like() => point_features.push((index, feature)),
            Ok(feature) if feature.kind().is_polygon_like() => {
                shape_features.push((index, feature))
            }
            Ok(feature) => report.skipped.push(SkippedFeature {
                index,
                id: feature.id,
                error: MapError::UnsupportedGeometry(format!(
                    "{} features are not ingested",
                    feature.source_kind
                )),
            }),
            Err(error) => report.skipped.push(SkippedFeature {
                index,
                id: source.resolve_id(index),
                error,
            }),
        }
    }

    for skipped in &report.skipped {
        log::warn!(
            "skipping GeoJSON feature {} ({}): {}",
            skipped.index,
            skipped.id,
            skipped.error
        );
    }

    if !shape_features.is_empty() {
        ensure_layer(layers, &options.shape_layer, options, Some(options.point_layer.as_str()))?;
        report.shapes = add_all(layers, &options.shape_layer, shape_features, &mut report.skipped);
    }
    if !point_features.is_empty() {
        ensure_layer(layers, &options.point_layer, options, None)?;
        report.points = add_all(layers, &options.point_layer, point_features, &mut report.skipped);
    }

    log::debug!(
        "ingested {} point and {} shape features, skipped {}",
        report.points,
        report.shapes,
        report.skipped.len()
    );
    Ok(report)
}

/// Creates `name` if missing, below `below` when that layer already exists
fn ensure_layer(
    layers: &mut LayerManager,
    name: &str,
    options: &IngestOptions,
    below: Option<&str>,
) -> Result<()> {
    if layers.contains(name) {
        return Ok(());
    }
    let mut layer = Layer::new(name);
    layer.set_label_key(options.label_key.clone());

    let position = below.and_then(|other| layers.list_layers().iter().position(|n| n == other));
    match position {
        Some(position) => layers.insert_layer(position, layer),
        None => layers.add_layer(layer),
    }
}

fn add_all(
    layers: &mut LayerManager,
    name: &str,
    features: Vec<(usize, Feature)>,
    skipped: &mut Vec<SkippedFeature>,
) -> usize {
    let Some(layer) = layers.get_layer_mut(name) else {
        return 0;
    };
    let mut added = 0;
    for (index, feature) in features {
        let id = feature.id.clone();
        match layer.add_feature(feature) {
            Ok(_) => added += 1,
            Err(error) => {
                log::warn!("layer '{}' rejected feature {}: {}", name, id, error);
                skipped.push(SkippedFeature { index, id, error });
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::feature::GeometryKind;

    const COLLECTION: &str = r#"
    {
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 7,
                "properties": {"name": "Capitol", "radius": 6},
                "geometry": {"type": "Point", "coordinates": [-77.0091, 38.8899]}
            },
            {
                "type": "Feature",
                "properties": {"id": "mall"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-77.05, 38.88], [-77.00, 38.88], [-77.00, 38.89], [-77.05, 38.89], [-77.05, 38.88]]]
                }
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
            },
            {
                "type": "Feature",
                "properties": {"label": "pair"},
                "geometry": {"type": "MultiPoint", "coordinates": [[1, 1, 30], [2, 2]]}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [5]}
            },
            {
                "type": "Feature",
                "geometry": null
            }
        ]
    }
    "#;

    #[test]
    fn test_parse_feature_collection() {
        let geojson: GeoJson = COLLECTION.parse().unwrap();
        let features = geojson.features();
        assert_eq!(features.len(), 6);
        assert_eq!(features[0].resolve_id(0), "7");
        assert_eq!(features[1].resolve_id(1), "mall");
        assert_eq!(features[2].resolve_id(2), "feature-2");
    }

    #[test]
    fn test_bare_geometry_and_single_feature() {
        let geometry: GeoJson =
            serde_json::from_str(r#"{"type": "Point", "coordinates": [-74.006, 40.7128]}"#).unwrap();
        assert!(matches!(geometry, GeoJson::Geometry(GeoJsonGeometry::Point { .. })));
        assert_eq!(geometry.features().len(), 1);

        let feature: GeoJson = serde_json::from_str(
            r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}}"#,
        )
        .unwrap();
        assert!(matches!(feature, GeoJson::Feature(_)));
    }

    #[test]
    fn test_ingest_distributes_and_reports() {
        let geojson: GeoJson = COLLECTION.parse().unwrap();
        let mut layers = LayerManager::new();
        let report = ingest(&geojson, &mut layers, &IngestOptions::default()).unwrap();

        assert_eq!(report.points, 2);
        assert_eq!(report.shapes, 1);
        assert_eq!(report.skipped.len(), 3);
        assert!(report
            .skipped
            .iter()
            .all(|s| matches!(s.error, MapError::UnsupportedGeometry(_))));

        let names = layers.list_layers();
        assert_eq!(names, vec!["polygons".to_string(), "points".to_string()]);

        let points = layers.get_layer("points").unwrap();
        assert_eq!(points.feature_count(), 3);
        assert_eq!(points.features()[0].style.radius, 6.0);
        assert_eq!(points.features()[1].source_kind, GeometryKind::MultiPoint);
        assert_eq!(points.features()[2].part, Some(1));
    }

    #[test]
    fn test_ingest_reuses_existing_layers() {
        let mut layers = LayerManager::new();
        layers.add_layer(Layer::new("points")).unwrap();
        layers.add_layer(Layer::new("polygons")).unwrap();
        let geojson: GeoJson = COLLECTION.parse().unwrap();

        ingest(&geojson, &mut layers, &IngestOptions::default()).unwrap();
        ingest(&geojson, &mut layers, &IngestOptions::default()).unwrap();

        assert_eq!(layers.len(), 2);
        assert_eq!(layers.list_layers(), vec!["points".to_string(), "polygons".to_string()]);
        assert_eq!(layers.get_layer("points").unwrap().feature_count(), 6);
    }

    #[test]
    fn test_bounds_calculation() {
        let geojson = GeoJson::FeatureCollection {
            features: vec![
                GeoJsonFeature {
                    geometry: Some(GeoJsonGeometry::Point {
                        coordinates: vec![-74.0060, 40.7128],
                    }),
                    ..GeoJsonFeature::default()
                },
                GeoJsonFeature {
                    geometry: Some(GeoJsonGeometry::Point {
                        coordinates: vec![-73.9857, 40.7489],
                    }),
                    ..GeoJsonFeature::default()
                },
            ],
        };

        let bounds = geojson.bounds().unwrap();
        assert_eq!(bounds.south_west.lat, 40.7128);
        assert_eq!(bounds.north_east.lat, 40.7489);
    }
}
