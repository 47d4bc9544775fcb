use shakeimpact::cities::{search_cities, MemoryPopulationSource, PlaceRecord};
use shakeimpact::geometry::{Coordinate, Rectangle};
use shakeimpact::raster::NO_DATA;
use shakeimpact::{
    CitySearchOutcome, EventWorkspace, IntensityRaster, Pipeline, PipelineConfig,
    ResampleAlgorithm, SearchConfig, ShakeEvent,
};

fn grid_document() -> String {
    let mut data = String::new();
    for r in 0..5 {
        let lat = 2.0 - r as f64 * 0.5;
        for c in 0..5 {
            let lon = 122.0 + c as f64 * 0.5;
            data.push_str(&format!("{lon:.4} {lat:.4} 5.00\n"));
        }
    }
    format!(
        r#"<shakemap_grid event_id="20120807015938">
<event magnitude="5.1" depth="206" lat="1.00" lon="123.00"
    event_timestamp="2012-08-07T01:55:12WIB"
    event_description="Halmahera, Indonesia" />
<grid_specification lon_min="122.00" lat_min="0.00" lon_max="124.00"
    lat_max="2.00" nlon="5" nlat="5" />
<grid_field index="1" name="LON" units="dd" />
<grid_field index="2" name="LAT" units="dd" />
<grid_field index="3" name="MMI" units="intensity" />
<grid_data>
{data}</grid_data>
</shakemap_grid>
"#
    )
}

fn event() -> ShakeEvent {
    let workspace = EventWorkspace::new("20120807015938", "/tmp/shakeimpact-tests");
    ShakeEvent::from_document(workspace, &grid_document()).unwrap()
}

fn place(id: u64, name: &str, population: u64, lon: f64, lat: f64) -> PlaceRecord {
    PlaceRecord {
        id,
        feature_code: "PPL".to_string(),
        population,
        ascii_name: name.to_string(),
        coordinate: Coordinate::new(lon, lat),
    }
}

fn assert_boxes_grow(outcome: &CitySearchOutcome) {
    for pair in outcome.boxes.windows(2) {
        assert!(pair[1].rectangle.area() >= pair[0].rectangle.area());
    }
}

#[test]
fn offshore_event_exhausts_every_attempt_and_reports_empty() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let mut event = event();
    let source = MemoryPopulationSource::default();
    let outcome = pipeline
        .search_cities(&mut event, &source, ResampleAlgorithm::Nearest, false)
        .unwrap();

    assert!(outcome.cities.is_empty());
    assert_eq!(
        outcome.boxes.len(),
        pipeline.config().search.attempt_limit as usize
    );
    assert_boxes_grow(outcome);
    for search_box in &outcome.boxes {
        assert_eq!(search_box.city_count, 0);
    }
}

#[test]
fn each_expansion_scales_the_rectangle_by_the_zoom_factor() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let mut event = event();
    let source = MemoryPopulationSource::default();
    let outcome = pipeline
        .search_cities(&mut event, &source, ResampleAlgorithm::Nearest, false)
        .unwrap();

    let factor = pipeline.config().search.zoom_factor;
    for pair in outcome.boxes.windows(2) {
        let prev = &pair[0].rectangle;
        let next = &pair[1].rectangle;
        assert!((next.width() - prev.width() * factor).abs() < 1e-9);
        assert!((next.height() - prev.height() * factor).abs() < 1e-9);
        assert!((next.center().lon - prev.center().lon).abs() < 1e-9);
        assert!((next.center().lat - prev.center().lat).abs() < 1e-9);
    }
}

#[test]
fn search_stops_at_the_first_rectangle_meeting_the_minimum() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let mut event = event();
    let source = MemoryPopulationSource::new(vec![place(1, "Ternate", 5000, 123.0, 1.0)]);
    let outcome = pipeline
        .search_cities(&mut event, &source, ResampleAlgorithm::Nearest, false)
        .unwrap();

    assert_eq!(outcome.boxes.len(), 1);
    assert_eq!(outcome.cities.len(), 1);
    assert_eq!(outcome.extent_with_cities, outcome.boxes[0].rectangle);
}

#[test]
fn higher_minimum_keeps_expanding_past_an_early_match() {
    let config = PipelineConfig {
        search: SearchConfig {
            minimum_city_count: 2,
            ..SearchConfig::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config);
    let mut event = event();
    // One city inside the extent, a second just outside it.
    let source = MemoryPopulationSource::new(vec![
        place(1, "Ternate", 5000, 123.0, 1.0),
        place(2, "Bitung", 40_000, 124.2, 1.0),
    ]);
    let outcome = pipeline
        .search_cities(&mut event, &source, ResampleAlgorithm::Nearest, false)
        .unwrap();

    assert!(outcome.boxes.len() > 1);
    assert_eq!(outcome.boxes[0].city_count, 1);
    assert_eq!(outcome.boxes.last().unwrap().city_count, 2);
    assert_boxes_grow(outcome);
    // The outsider intersects the final box but has no raster intensity,
    // so only the inside city survives into the list.
    assert_eq!(outcome.cities.len(), 1);
    assert_eq!(outcome.cities[0].name, "Ternate");
}

#[test]
fn city_on_a_no_data_cell_counts_toward_the_box_but_not_the_list() {
    let mut values = vec![5.0; 16];
    values[5] = NO_DATA; // row 1, col 1
    let raster = IntensityRaster::new(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, values).unwrap();

    let hole_city = place(1, "Hole", 900, 1.5, 2.5);
    let solid_city = place(2, "Solid", 100, 2.5, 2.5);
    let source = MemoryPopulationSource::new(vec![hole_city, solid_city]);
    let outcome = search_cities(
        &raster,
        Coordinate::new(2.0, 2.0),
        &source,
        &SearchConfig::default(),
    );

    assert_eq!(outcome.boxes[0].city_count, 2);
    assert_eq!(outcome.cities.len(), 1);
    assert_eq!(outcome.cities[0].name, "Solid");
}
