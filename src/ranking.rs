//! Deterministic ranking of affected cities and small reporting helpers.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::cities::PopulationCenter;
use crate::grid::EventRecord;

pub const DEFAULT_ROW_COUNT: usize = 5;

/// Ranked output: the truncated report subset plus the most-affected pick
/// taken from the untruncated order.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub rows: Vec<PopulationCenter>,
    pub most_affected: Option<PopulationCenter>,
}

/// Sort cities by the full reproducibility key sequence and truncate to
/// `row_count` for reporting.
///
/// Key order: truncated intensity desc, population desc, name asc, exact
/// intensity desc, Roman label asc, distance asc, bearing-to asc,
/// bearing-from asc, id asc. Names are not unique, hence the long tail of
/// tie-breakers; if every key ties, the stable sort preserves insertion
/// order (documented, not guaranteed).
pub fn rank_cities(mut cities: Vec<PopulationCenter>, row_count: usize) -> Ranking {
    cities.sort_by(compare_cities);
    let most_affected = cities.first().cloned();
    cities.truncate(row_count);
    debug!(rows = cities.len(), "cities ranked");
    Ranking {
        rows: cities,
        most_affected,
    }
}

fn compare_cities(a: &PopulationCenter, b: &PopulationCenter) -> Ordering {
    (b.lookup_intensity.trunc() as i64)
        .cmp(&(a.lookup_intensity.trunc() as i64))
        .then_with(|| b.population.cmp(&a.population))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| b.lookup_intensity.total_cmp(&a.lookup_intensity))
        .then_with(|| a.roman_label.cmp(&b.roman_label))
        .then_with(|| a.distance_to_epicenter.total_cmp(&b.distance_to_epicenter))
        .then_with(|| a.bearing_to_epicenter.total_cmp(&b.bearing_to_epicenter))
        .then_with(|| a.bearing_from_epicenter.total_cmp(&b.bearing_from_epicenter))
        .then_with(|| a.id.cmp(&b.id))
}

/// Humanized elapsed time between the event origin and `now`, for report
/// headers ("how long ago did this happen").
pub fn format_elapsed(origin: NaiveDateTime, now: NaiveDateTime) -> String {
    let elapsed = now.signed_duration_since(origin);
    let minutes = elapsed.num_minutes();
    if minutes < 0 {
        return "in the future".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{}h {}m", hours, minutes - hours * 60);
    }
    let days = elapsed.num_days();
    format!("{}d {}h", days, hours - days * 24)
}

/// One-line event identity used by report headers.
pub fn event_identity(event_id: &str, record: &EventRecord) -> String {
    format!(
        "{} M{:.1} {} ({:.2}, {:.2}) depth {:.0}km",
        event_id,
        record.magnitude,
        record.location,
        record.epicenter.lon,
        record.epicenter.lat,
        record.depth_km,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinate;

    fn city(id: u64, name: &str, population: u64, intensity: f64) -> PopulationCenter {
        PopulationCenter {
            id,
            name: name.to_string(),
            population,
            coordinate: Coordinate::new(0.0, 0.0),
            lookup_intensity: intensity,
            distance_to_epicenter: 1.0,
            bearing_to_epicenter: 0.0,
            bearing_from_epicenter: 180.0,
            roman_label: "V".to_string(),
            color_hex: "#aaffff".to_string(),
        }
    }

    #[test]
    fn truncated_intensity_dominates_population() {
        let ranking = rank_cities(
            vec![city(1, "Small", 10, 6.2), city(2, "Huge", 1_000_000, 5.9)],
            5,
        );
        assert_eq!(ranking.rows[0].name, "Small");
        assert_eq!(ranking.most_affected.as_ref().unwrap().name, "Small");
    }

    #[test]
    fn name_breaks_intensity_and_population_ties_regardless_of_input_order() {
        let forward = rank_cities(vec![city(1, "Alpha", 100, 5.0), city(2, "Beta", 100, 5.0)], 5);
        let reversed = rank_cities(vec![city(2, "Beta", 100, 5.0), city(1, "Alpha", 100, 5.0)], 5);
        assert_eq!(forward.rows[0].name, "Alpha");
        assert_eq!(reversed.rows[0].name, "Alpha");
    }

    #[test]
    fn exact_intensity_breaks_ties_after_name() {
        let ranking = rank_cities(
            vec![city(1, "Same", 100, 5.1), city(2, "Same", 100, 5.6)],
            5,
        );
        assert_eq!(ranking.rows[0].id, 2);
    }

    #[test]
    fn most_affected_ignores_truncation() {
        let cities: Vec<_> = (0..10)
            .map(|i| city(i, &format!("City{i}"), 100 + i, 4.0))
            .collect();
        let ranking = rank_cities(cities, 3);
        assert_eq!(ranking.rows.len(), 3);
        // Highest population wins at equal intensity.
        assert_eq!(ranking.most_affected.unwrap().population, 109);
    }

    #[test]
    fn empty_city_list_ranks_to_empty() {
        let ranking = rank_cities(Vec::new(), 5);
        assert!(ranking.rows.is_empty());
        assert!(ranking.most_affected.is_none());
    }

    #[test]
    fn id_is_the_final_tiebreak() {
        let ranking = rank_cities(
            vec![city(9, "Twin", 100, 5.0), city(3, "Twin", 100, 5.0)],
            5,
        );
        assert_eq!(ranking.rows[0].id, 3);
    }

    #[test]
    fn elapsed_formats_by_magnitude() {
        let origin = NaiveDateTime::parse_from_str("2012-08-07T01:55:12", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        let plus = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap();
        assert_eq!(format_elapsed(origin, plus("2012-08-07T02:10:12")), "15m");
        assert_eq!(format_elapsed(origin, plus("2012-08-07T04:00:12")), "2h 5m");
        assert_eq!(format_elapsed(origin, plus("2012-08-09T03:55:12")), "2d 2h");
    }
}
