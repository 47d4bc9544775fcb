//! Expanding spatial search for affected population centers.
//!
//! Starting from the intensity raster's extent, the search repeatedly counts
//! population centers intersecting the rectangle; while the count is below
//! the configured minimum it scales the rectangle about its own center by a
//! fixed factor and retries, giving up after a fixed number of attempts.
//! Every attempted rectangle is retained as a [`SearchBox`] for diagnostics
//! and map composition. Finding no cities at all is a valid terminal outcome
//! (an offshore epicenter, for example), never an error.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::geometry::{Coordinate, Rectangle};
use crate::raster::IntensityRaster;
use crate::style;

fn default_zoom_factor() -> f64 {
    1.25
}

fn default_attempt_limit() -> u32 {
    5
}

fn default_minimum_city_count() -> usize {
    1
}

/// Tunables for the expanding search. The fixed-factor, fixed-attempt
/// behavior is deliberate; downstream outputs were calibrated against it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f64,
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: u32,
    #[serde(default = "default_minimum_city_count")]
    pub minimum_city_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            zoom_factor: default_zoom_factor(),
            attempt_limit: default_attempt_limit(),
            minimum_city_count: default_minimum_city_count(),
        }
    }
}

/// One point record from the population-center source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: u64,
    pub feature_code: String,
    pub population: u64,
    pub ascii_name: String,
    pub coordinate: Coordinate,
}

/// Queryable point dataset of population centers.
pub trait PopulationSource {
    /// All records whose geometry intersects the rectangle, exact test.
    fn query(&self, rectangle: Rectangle) -> Vec<PlaceRecord>;
}

/// In-memory population source, mainly for tests and small fixtures.
#[derive(Debug, Default)]
pub struct MemoryPopulationSource {
    records: Vec<PlaceRecord>,
}

impl MemoryPopulationSource {
    pub fn new(records: Vec<PlaceRecord>) -> Self {
        Self { records }
    }
}

impl PopulationSource for MemoryPopulationSource {
    fn query(&self, rectangle: Rectangle) -> Vec<PlaceRecord> {
        self.records
            .iter()
            .filter(|record| rectangle.contains(record.coordinate))
            .cloned()
            .collect()
    }
}

/// One attempted search rectangle and the intersection count it produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBox {
    pub rectangle: Rectangle,
    pub city_count: usize,
}

/// An affected population center with its derived reporting fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationCenter {
    pub id: u64,
    pub name: String,
    pub population: u64,
    pub coordinate: Coordinate,
    pub lookup_intensity: f64,
    pub distance_to_epicenter: f64,
    pub bearing_to_epicenter: f64,
    pub bearing_from_epicenter: f64,
    pub roman_label: String,
    pub color_hex: String,
}

/// Result of one expanding search.
#[derive(Debug, Clone)]
pub struct CitySearchOutcome {
    pub cities: Vec<PopulationCenter>,
    pub boxes: Vec<SearchBox>,
    /// The final rectangle, successful or not; downstream map composition
    /// uses it as the "extent with cities".
    pub extent_with_cities: Rectangle,
}

/// Populated-place feature codes (the geonames `PPL` family).
fn is_populated_place(feature_code: &str) -> bool {
    feature_code.starts_with("PPL")
}

/// Run the expanding search and build the population-center list from the
/// winning rectangle.
pub fn search_cities(
    raster: &IntensityRaster,
    epicenter: Coordinate,
    source: &dyn PopulationSource,
    config: &SearchConfig,
) -> CitySearchOutcome {
    let mut rectangle = raster.extent();
    let mut boxes = Vec::with_capacity(config.attempt_limit as usize);
    let mut matches = Vec::new();

    for attempt in 0..config.attempt_limit {
        let found = source.query(rectangle);
        debug!(
            attempt,
            count = found.len(),
            "expanding search attempt"
        );
        boxes.push(SearchBox {
            rectangle,
            city_count: found.len(),
        });
        matches = found;
        if matches.len() >= config.minimum_city_count {
            break;
        }
        if attempt + 1 < config.attempt_limit {
            rectangle = rectangle.scaled_about_center(config.zoom_factor);
        }
    }

    let cities = build_population_centers(matches, raster, epicenter);
    info!(
        cities = cities.len(),
        attempts = boxes.len(),
        "expanding search finished"
    );
    CitySearchOutcome {
        cities,
        boxes,
        extent_with_cities: rectangle,
    }
}

/// Filter eligible places and derive the reporting fields. A place is
/// dropped when it is not a populated place, has population below 1, sits on
/// a no-data raster cell, or its rounded intensity has no Roman rendering.
fn build_population_centers(
    records: Vec<PlaceRecord>,
    raster: &IntensityRaster,
    epicenter: Coordinate,
) -> Vec<PopulationCenter> {
    let mut cities = Vec::new();
    for record in records {
        if !is_populated_place(&record.feature_code) || record.population < 1 {
            continue;
        }
        let lookup_intensity = match raster.sample(record.coordinate) {
            Some(value) => value,
            None => {
                debug!(name = %record.ascii_name, "no intensity at city location, skipped");
                continue;
            }
        };
        let roman_label = match style::romanize(lookup_intensity) {
            Some(label) => label.to_string(),
            None => {
                debug!(name = %record.ascii_name, "intensity not romanizable, skipped");
                continue;
            }
        };
        cities.push(PopulationCenter {
            id: record.id,
            name: record.ascii_name,
            population: record.population,
            coordinate: record.coordinate,
            lookup_intensity,
            distance_to_epicenter: record.coordinate.squared_distance_to(epicenter),
            bearing_to_epicenter: record.coordinate.bearing_to(epicenter),
            bearing_from_epicenter: record.coordinate.bearing_from(epicenter),
            roman_label,
            color_hex: style::mmi_color(lookup_intensity).to_string(),
        });
    }
    cities
}
