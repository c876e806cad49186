use slippymap::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Integration tests for real user interactions and scenarios
/// These tests drive the map the way a GUI adapter would
#[cfg(test)]
mod integration_tests {
    use super::*;
    use async_trait::async_trait;
    use slippymap::CallbackTarget;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Serves a PNG header for every tile after an optional delay
    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl TileFetcher for StubFetcher {
        async fn fetch(
            &self,
            coord: TileCoord,
            _url: String,
        ) -> std::result::Result<TileImage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            TileImage::decode_checked(coord, PNG_MAGIC.to_vec())
        }
    }

    /// Fails the way a crashing decoder would, without returning
    struct PanickingFetcher;

    #[async_trait]
    impl TileFetcher for PanickingFetcher {
        async fn fetch(
            &self,
            _coord: TileCoord,
            _url: String,
        ) -> std::result::Result<TileImage, FetchError> {
            panic!("tile decoder crashed")
        }
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn offline_map(center: LatLng, zoom: u8, width: u32, height: u32) -> Map {
        MapBuilder::web_map(center, zoom, width, height)
            .with_fetcher(Arc::new(StubFetcher::default()))
            .with_spawner(Arc::new(InlineSpawner))
            .build()
            .unwrap()
    }

    fn square(lat: f64, lng: f64, half: f64) -> Vec<LatLng> {
        vec![
            LatLng::new(lat - half, lng - half),
            LatLng::new(lat - half, lng + half),
            LatLng::new(lat + half, lng + half),
            LatLng::new(lat + half, lng - half),
            LatLng::new(lat - half, lng - half),
        ]
    }

    #[test]
    fn test_projection_round_trip_and_grid_size() {
        for zoom in [0, 7, 15, 19] {
            assert_eq!(tile_count(zoom), 4_u64.pow(zoom as u32));
            let p = LatLng::new(-33.8688, 151.2093);
            let t = degree_to_tile(&p, zoom);
            let back = tile_to_degree(t.x, t.y, zoom);
            assert!((back.lat - p.lat).abs() < 1e-9);
            assert!((back.lng - p.lng).abs() < 1e-9);
        }
        let east = degree_to_tile(&LatLng::new(0.0, 180.0), 6);
        let west = degree_to_tile(&LatLng::new(0.0, -180.0), 6);
        assert_eq!(east.x.floor(), west.x.floor());
    }

    /// Washington DC at z15 on an 800x600 canvas, then a one-canvas pan east
    #[test]
    fn test_pan_shifts_tile_origin_and_range() {
        init_logging();
        let mut map = offline_map(LatLng::new(38.8813, -77.0366), 15, 800, 600);
        let origin = map.viewport().origin_tile();
        let range = map.viewport().tile_range(15, 0);
        assert_eq!((range.min_x, range.max_x), (9370, 9373));
        assert_eq!((range.min_y, range.max_y), (12535, 12538));

        let keys = range.keys();
        assert_eq!(keys.len(), 16);
        assert!(keys.iter().all(|k| k.z == 15));
        let columns: HashSet<u32> = keys.iter().map(|k| k.x).collect();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns.iter().max().unwrap() - columns.iter().min().unwrap(), 3);

        assert!(map.pan_by(Point::new(800.0, 0.0)));
        let shifted = map.viewport().origin_tile();
        assert!((shifted.x - origin.x - 800.0 / 256.0).abs() < 1e-6);
        assert!((shifted.y - origin.y).abs() < 1e-6);

        let moved = map.viewport().tile_range(15, 0);
        assert_eq!((moved.min_x, moved.max_x), (9373, 9376));
        assert_eq!((moved.min_y, moved.max_y), (12535, 12538));
    }

    #[test]
    fn test_drag_then_zoom_keeps_anchor() {
        let mut map = offline_map(LatLng::new(48.8566, 2.3522), 12, 640, 480);
        map.drag_start(Point::new(320.0, 240.0));
        map.drag_move(Point::new(300.0, 260.0));

        let anchor = Point::new(100.0, 50.0);
        let pinned = map.pixel_to_lat_lng(&anchor);
        assert!(map.zoom_by(2, Some(anchor)));
        assert!(matches!(map.interaction_state(), InteractionState::Panning { .. }));
        map.drag_end();

        let after = map.project_lat_lng_to_pixel(&pinned);
        assert!(after.distance_to(&anchor) < 1e-6);
        assert_eq!(map.zoom(), 14);

        let events = map.take_events();
        assert!(matches!(events.first(), Some(MapEvent::MoveStart { .. })));
        assert!(matches!(events.last(), Some(MapEvent::MoveEnd { .. })));
    }

    #[test]
    fn test_overlapping_points_resolve_to_latest() {
        let mut map = offline_map(LatLng::new(10.0, 10.0), 8, 400, 400);
        let mut layer = Layer::new("points");
        layer.add_feature(Feature::point("A", 10.0, 10.0)).unwrap();
        layer.add_feature(Feature::point("B", 10.0, 10.0)).unwrap();
        map.add_layer(layer).unwrap();

        let result = map.handle_click(Point::new(200.0, 200.0)).unwrap();
        assert_eq!(result.feature.id, "B");
        assert_eq!(result.slot, 1);
        assert_eq!(result.target, CallbackTarget::None);
    }

    #[test]
    fn test_multipolygon_is_two_features_sharing_identity() {
        let properties: HashMap<String, serde_json::Value> =
            serde_json::from_value(serde_json::json!({ "name": "twins", "fill": "red" })).unwrap();
        let mut layer = Layer::new("shapes");
        let stored = layer
            .add_feature(
                Feature::new(
                    "twins",
                    FeatureGeometry::MultiPolygon(vec![
                        vec![square(0.0, 0.0, 1.0)],
                        vec![square(0.0, 5.0, 1.0)],
                    ]),
                )
                .with_properties(properties),
            )
            .unwrap();

        assert_eq!(stored, 2);
        let parts: Vec<&Feature> = layer.features_by_id("twins").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].properties, parts[1].properties);
        assert_eq!(parts[0].style.fill, Color::parse("red"));
        assert_eq!((parts[0].part, parts[1].part), (Some(0), Some(1)));
    }

    #[test]
    fn test_polygon_click_boundary_interior_and_hole() {
        let mut map = offline_map(LatLng::new(0.0, 0.0), 7, 800, 600);
        let mut layer = Layer::new("shapes");
        layer
            .add_feature(Feature::new(
                "frame",
                FeatureGeometry::Polygon(vec![square(0.0, 0.0, 2.0), square(0.0, 0.0, 0.5)]),
            ))
            .unwrap();
        map.add_layer(layer).unwrap();

        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&clicks);
        map.on_feature_click("frame", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let vertex = map.project_lat_lng_to_pixel(&LatLng::new(2.0, 2.0));
        assert!(map.handle_click(vertex).is_none());
        assert!(map.handle_click(Point::new(400.0, 300.0)).is_none());

        let interior = map.project_lat_lng_to_pixel(&LatLng::new(1.0, -1.0));
        let result = map.handle_click(interior).unwrap();
        assert_eq!(result.target, CallbackTarget::Feature);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut cache = TileCache::new(2);
        let a = TileCoord::new(0, 0, 1).unwrap();
        let b = TileCoord::new(1, 0, 1).unwrap();
        let c = TileCoord::new(0, 1, 1).unwrap();

        cache.insert(a, TileImage::new(a, vec![1])).unwrap();
        cache.insert(b, TileImage::new(b, vec![2])).unwrap();
        assert!(cache.get(&a).image().is_some());

        let evicted = cache.insert(c, TileImage::new(c, vec![3])).unwrap();
        assert_eq!(evicted, Some(b));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&a) && cache.contains(&c));
        assert_eq!(cache.get(&b), TileLookup::Miss);
    }

    #[test]
    fn test_geojson_layers_and_callbacks() {
        let document = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": "park", "properties": {"name": "Park"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-1, -1], [1, -1], [1, 1], [-1, 1], [-1, -1]]]}},
                {"type": "Feature", "id": "kiosk", "properties": {"name": "Kiosk"},
                 "geometry": {"type": "Point", "coordinates": [0, 0]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "GeometryCollection", "geometries": []}}
            ]
        }"#;
        let geojson: GeoJson = document.parse().unwrap();
        let mut map = offline_map(LatLng::new(0.0, 0.0), 6, 800, 600);
        let options = IngestOptions {
            label_key: Some("name".into()),
            ..IngestOptions::default()
        };
        let report = map.load_geojson(&geojson, &options).unwrap();
        assert_eq!((report.points, report.shapes, report.skipped.len()), (1, 1, 1));

        // The point sits above the polygon that contains it
        let center = Point::new(400.0, 300.0);
        assert_eq!(map.handle_click(center).unwrap().feature.id, "kiosk");

        let beside = map.project_lat_lng_to_pixel(&LatLng::new(0.5, 0.5));
        let result = map.handle_click(beside).unwrap();
        assert_eq!((result.layer.as_str(), result.feature.id.as_str()), ("polygons", "park"));

        let points = map.layer("points").unwrap();
        assert_eq!(points.label_text(&points.features()[0]).as_deref(), Some("Kiosk"));
        assert_eq!(map.visible_features().len(), 2);
    }

    /// Above 85.05 degrees a point is drawn at the map edge and must be pickable there
    #[test]
    fn test_polar_point_is_visible_and_clickable() {
        let mut map = offline_map(LatLng::new(84.0, 0.0), 3, 800, 600);
        let mut layer = Layer::new("points");
        layer.add_feature(Feature::point("polar", 89.0, 0.0)).unwrap();
        layer.add_feature(Feature::point("south", -89.0, 0.0)).unwrap();
        map.add_layer(layer).unwrap();

        let visible = map.visible_features();
        let ids: Vec<&str> = visible[0].1.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["polar"]);

        let pixel = map.project_lat_lng_to_pixel(&LatLng::new(89.0, 0.0));
        assert!(pixel.y > 0.0 && pixel.y < 600.0);
        let result = map.handle_click(pixel).unwrap();
        assert_eq!(result.feature.id, "polar");
    }

    #[test]
    fn test_hover_enter_and_leave() {
        let mut map = offline_map(LatLng::new(0.0, 0.0), 6, 800, 600);
        let mut layer = Layer::new("points");
        layer.add_feature(Feature::point("kiosk", 0.0, 0.0)).unwrap();
        map.add_layer(layer).unwrap();

        let entered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entered);
        map.callbacks_mut()
            .on_feature("kiosk", ClickKind::Enter, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        map.take_events();

        let center = Point::new(400.0, 300.0);
        assert!(!map.handle_input(&InputEvent::PointerMove { position: center }));
        map.handle_input(&InputEvent::PointerMove {
            position: Point::new(401.0, 301.0),
        });
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(map.hovered_feature().map(|(layer, _)| layer), Some("points"));

        map.handle_input(&InputEvent::PointerLeave);
        assert!(map.hovered_feature().is_none());
        let events = map.take_events();
        assert!(matches!(
            events.as_slice(),
            [MapEvent::FeatureEnter { .. }, MapEvent::FeatureLeave { feature_id, .. }]
                if feature_id == "kiosk"
        ));
    }

    /// A fetch that panics still counts as a failed attempt
    #[test]
    fn test_panicking_fetch_becomes_persistent_miss() {
        init_logging();
        let mut map = MapBuilder::low_resource(LatLng::new(0.0, 0.0), 0, 256, 256)
            .with_tile_retries(0, 10, false)
            .with_fetcher(Arc::new(PanickingFetcher))
            .with_spawner(Arc::new(ThreadSpawner))
            .build()
            .unwrap();

        let first = map.request_visible_tiles();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].lookup, TileLookup::Pending);

        let updates = map.poll_tiles_blocking(Duration::from_secs(5));
        assert!(matches!(updates.as_slice(), [TileUpdate::Failed(_)]));
        assert_eq!(map.pending_tiles(), 0);

        let again = map.request_visible_tiles();
        assert_eq!(again[0].lookup, TileLookup::PersistentMiss);
    }

    /// Two requests for a tile whose fetch is still running share one fetch
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_fetch_once() {
        init_logging();
        let fetcher = Arc::new(StubFetcher {
            delay_ms: 50,
            ..StubFetcher::default()
        });
        let spawner = TokioSpawner::current().unwrap();
        let mut map = MapBuilder::low_resource(LatLng::new(0.0, 0.0), 0, 256, 256)
            .with_fetcher(fetcher.clone())
            .with_spawner(Arc::new(spawner))
            .build()
            .unwrap();

        let first = map.request_visible_tiles();
        let second = map.request_visible_tiles();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].lookup, TileLookup::Pending);
        assert_eq!(second[0].lookup, TileLookup::Pending);
        assert_eq!(map.pending_tiles(), 1);

        let updates = map.poll_tiles_blocking(Duration::from_secs(5));
        assert!(matches!(updates.as_slice(), [TileUpdate::Ready(_)]));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let ready = map.request_visible_tiles();
        let image = ready[0].lookup.image().unwrap();
        assert_eq!(image.format, Some(image::ImageFormat::Png));
        assert_eq!(map.tile_cache().stats().hits, 1);
    }
}
