//! Impact aggregation: raster co-registration and per-band exposure,
//! displacement, and fatality counts.
//!
//! The hazard (intensity) and exposure (population) layers rarely share a
//! native resolution. Before any statistic is computed the two are clipped
//! and resampled to a common lattice: the finer of the two cell sizes per
//! axis, always over the hazard raster's extent. Exposure shortfall (cells
//! the exposure layer does not cover) resamples to zero, never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::geometry::Rectangle;
use crate::raster::{IntensityRaster, RasterError};

/// Intensity bands tracked by the summary. Band 1 and below are not.
pub const BAND_MIN: u8 = 2;
pub const BAND_MAX: u8 = 9;

#[derive(Debug, Error)]
pub enum ImpactError {
    #[error("fatality estimate is missing band {band} in the '{table}' table")]
    MissingBand { table: &'static str, band: u8 },
    #[error(transparent)]
    Raster(#[from] RasterError),
}

/// Raw output of a fatality-estimation function: per-band tables plus the
/// fatality total. Band presence is validated by [`ImpactSummary::from_estimate`],
/// not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FatalityEstimate {
    pub exposed_per_band: BTreeMap<u8, f64>,
    pub displaced_per_band: BTreeMap<u8, f64>,
    pub fatalities_per_band: BTreeMap<u8, f64>,
    pub total_fatalities: f64,
}

/// Validated per-band impact statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub per_band_affected: BTreeMap<u8, f64>,
    pub per_band_displaced: BTreeMap<u8, f64>,
    pub per_band_fatalities: BTreeMap<u8, f64>,
    pub total_fatalities: f64,
}

impl ImpactSummary {
    /// Every band 2..=9 must be present in every table; a hole is fatal and
    /// is never papered over with a default, since downstream reporting
    /// renders one row per band.
    pub fn from_estimate(estimate: FatalityEstimate) -> Result<Self, ImpactError> {
        for band in BAND_MIN..=BAND_MAX {
            if !estimate.exposed_per_band.contains_key(&band) {
                return Err(ImpactError::MissingBand {
                    table: "exposed",
                    band,
                });
            }
            if !estimate.displaced_per_band.contains_key(&band) {
                return Err(ImpactError::MissingBand {
                    table: "displaced",
                    band,
                });
            }
            if !estimate.fatalities_per_band.contains_key(&band) {
                return Err(ImpactError::MissingBand {
                    table: "fatalities",
                    band,
                });
            }
        }
        Ok(Self {
            per_band_affected: estimate.exposed_per_band,
            per_band_displaced: estimate.displaced_per_band,
            per_band_fatalities: estimate.fatalities_per_band,
            total_fatalities: estimate.total_fatalities,
        })
    }
}

/// Fatality-estimation collaborator: consumes two co-registered layers.
pub trait FatalityModel {
    fn estimate(
        &self,
        hazard: &IntensityRaster,
        exposure: &IntensityRaster,
    ) -> FatalityEstimate;
}

fn default_displacement_threshold() -> f64 {
    6.0
}

/// Reference fatality model: a fixed mortality rate per intensity band
/// applied to the exposed population, with everyone in bands at or above the
/// displacement threshold counted as displaced.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BandRateModel {
    pub fatality_rates: BTreeMap<u8, f64>,
    #[serde(default = "default_displacement_threshold")]
    pub displacement_threshold: f64,
}

impl Default for BandRateModel {
    fn default() -> Self {
        let mut fatality_rates = BTreeMap::new();
        // Mortality grows roughly tenfold per band over the damaging range.
        for (band, rate) in [
            (2u8, 0.0),
            (3, 0.0),
            (4, 0.0),
            (5, 0.0),
            (6, 1.0e-5),
            (7, 1.0e-4),
            (8, 1.0e-3),
            (9, 1.0e-2),
        ] {
            fatality_rates.insert(band, rate);
        }
        Self {
            fatality_rates,
            displacement_threshold: default_displacement_threshold(),
        }
    }
}

impl FatalityModel for BandRateModel {
    fn estimate(
        &self,
        hazard: &IntensityRaster,
        exposure: &IntensityRaster,
    ) -> FatalityEstimate {
        let mut estimate = FatalityEstimate::default();
        for band in BAND_MIN..=BAND_MAX {
            estimate.exposed_per_band.insert(band, 0.0);
            estimate.displaced_per_band.insert(band, 0.0);
            estimate.fatalities_per_band.insert(band, 0.0);
        }

        let no_data = hazard.no_data_value();
        for row in 0..hazard.height() {
            for col in 0..hazard.width() {
                let intensity = hazard.value(row, col);
                if intensity == no_data || !intensity.is_finite() {
                    continue;
                }
                let band = intensity.round();
                if band < BAND_MIN as f64 || band > BAND_MAX as f64 {
                    continue;
                }
                let band = band as u8;
                let people = exposure.value(row, col);
                let people = if people == exposure.no_data_value() || people < 0.0 {
                    0.0
                } else {
                    people
                };
                *estimate.exposed_per_band.get_mut(&band).expect("band seeded") += people;
                if f64::from(band) >= self.displacement_threshold {
                    *estimate
                        .displaced_per_band
                        .get_mut(&band)
                        .expect("band seeded") += people;
                }
                let rate = self.fatality_rates.get(&band).copied().unwrap_or(0.0);
                *estimate
                    .fatalities_per_band
                    .get_mut(&band)
                    .expect("band seeded") += people * rate;
            }
        }
        estimate.total_fatalities = estimate.fatalities_per_band.values().sum();
        estimate
    }
}

/// Clip and resample two layers to a shared lattice: the finer cell size of
/// the two per axis, over the hazard extent. Exposure cells with no source
/// coverage become zero.
pub fn co_register(
    hazard: &IntensityRaster,
    exposure: &IntensityRaster,
) -> Result<(IntensityRaster, IntensityRaster), ImpactError> {
    let cell_x = hazard.cell_size_x().min(exposure.cell_size_x());
    let cell_y = hazard.cell_size_y().min(exposure.cell_size_y());
    let extent = hazard.extent();
    let width = (extent.width() / cell_x).round().max(1.0) as u32;
    let height = (extent.height() / cell_y).round().max(1.0) as u32;
    debug!(width, height, "co-registering hazard and exposure layers");

    let hazard_out = resample_to(hazard, extent, width, height, hazard.no_data_value())?;
    let exposure_out = resample_to(exposure, extent, width, height, 0.0)?;
    Ok((hazard_out, exposure_out))
}

/// Nearest-cell resample of `source` onto a target lattice; `fill` is used
/// where the source has no coverage or no data.
fn resample_to(
    source: &IntensityRaster,
    extent: Rectangle,
    width: u32,
    height: u32,
    fill: f64,
) -> Result<IntensityRaster, RasterError> {
    let cell_x = extent.width() / width as f64;
    let cell_y = extent.height() / height as f64;
    let mut values = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height {
        let lat = extent.y_max - (row as f64 + 0.5) * cell_y;
        for col in 0..width {
            let lon = extent.x_min + (col as f64 + 0.5) * cell_x;
            let value = source
                .sample(crate::geometry::Coordinate::new(lon, lat))
                .unwrap_or(fill);
            values.push(value);
        }
    }
    IntensityRaster::new(extent, width, height, values)
}

/// Co-register the layers and run the fatality model, validating its output.
pub fn compute_impact(
    hazard: &IntensityRaster,
    exposure: &IntensityRaster,
    model: &dyn FatalityModel,
) -> Result<ImpactSummary, ImpactError> {
    let (hazard_aligned, exposure_aligned) = co_register(hazard, exposure)?;
    let estimate = model.estimate(&hazard_aligned, &exposure_aligned);
    let summary = ImpactSummary::from_estimate(estimate)?;
    info!(
        total_fatalities = summary.total_fatalities,
        "impact computed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;

    fn uniform_raster(
        extent: Rectangle,
        width: u32,
        height: u32,
        value: f64,
    ) -> IntensityRaster {
        let values = vec![value; width as usize * height as usize];
        IntensityRaster::new(extent, width, height, values).unwrap()
    }

    #[test]
    fn co_registration_picks_finer_cell_and_hazard_extent() {
        let hazard = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, 6.0);
        let exposure = uniform_raster(Rectangle::new(0.0, 0.0, 8.0, 8.0), 16, 16, 100.0);
        let (h, e) = co_register(&hazard, &exposure).unwrap();
        // Exposure cells are 0.5 degrees, finer than the hazard's 1.0.
        assert_eq!(h.width(), 8);
        assert_eq!(h.height(), 8);
        assert_eq!(h.extent(), hazard.extent());
        assert_eq!(e.extent(), hazard.extent());
        assert_eq!(e.width(), h.width());
    }

    #[test]
    fn exposure_shortfall_resamples_to_zero() {
        let hazard = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, 6.0);
        // Exposure only covers the western half of the hazard extent.
        let exposure = uniform_raster(Rectangle::new(0.0, 0.0, 2.0, 4.0), 2, 4, 100.0);
        let (_, e) = co_register(&hazard, &exposure).unwrap();
        let west = e.sample(crate::geometry::Coordinate::new(0.5, 2.0)).unwrap();
        assert_eq!(west, 100.0);
        // Outside the exposure coverage the resampled value is zero, and
        // zero is data here, not a hole.
        assert_eq!(e.value(0, e.width() - 1), 0.0);
    }

    #[test]
    fn band_rate_model_seeds_every_band() {
        let hazard = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, 7.0);
        let exposure = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, 1000.0);
        let estimate = BandRateModel::default().estimate(&hazard, &exposure);
        for band in BAND_MIN..=BAND_MAX {
            assert!(estimate.exposed_per_band.contains_key(&band));
            assert!(estimate.displaced_per_band.contains_key(&band));
            assert!(estimate.fatalities_per_band.contains_key(&band));
        }
        // 16 cells x 1000 people at band 7.
        assert_eq!(estimate.exposed_per_band[&7], 16_000.0);
        assert_eq!(estimate.displaced_per_band[&7], 16_000.0);
        assert!((estimate.fatalities_per_band[&7] - 1.6).abs() < 1e-9);
        assert!((estimate.total_fatalities - 1.6).abs() < 1e-9);
    }

    #[test]
    fn bands_outside_tracked_range_are_ignored() {
        let hazard = uniform_raster(Rectangle::new(0.0, 0.0, 2.0, 2.0), 2, 2, 1.0);
        let exposure = uniform_raster(Rectangle::new(0.0, 0.0, 2.0, 2.0), 2, 2, 500.0);
        let estimate = BandRateModel::default().estimate(&hazard, &exposure);
        let total_exposed: f64 = estimate.exposed_per_band.values().sum();
        assert_eq!(total_exposed, 0.0);
    }

    #[test]
    fn missing_band_is_fatal() {
        let mut estimate = FatalityEstimate::default();
        for band in BAND_MIN..=BAND_MAX {
            estimate.exposed_per_band.insert(band, 0.0);
            estimate.displaced_per_band.insert(band, 0.0);
            estimate.fatalities_per_band.insert(band, 0.0);
        }
        estimate.fatalities_per_band.remove(&5);
        let err = ImpactSummary::from_estimate(estimate).unwrap_err();
        match err {
            ImpactError::MissingBand { table, band } => {
                assert_eq!(table, "fatalities");
                assert_eq!(band, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn compute_impact_end_to_end() {
        let hazard = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 4, 4, 8.0);
        let exposure = uniform_raster(Rectangle::new(0.0, 0.0, 4.0, 4.0), 8, 8, 250.0);
        let summary = compute_impact(&hazard, &exposure, &BandRateModel::default()).unwrap();
        // 64 fine cells x 250 people, all at band 8.
        assert_eq!(summary.per_band_affected[&8], 16_000.0);
        assert!((summary.total_fatalities - 16.0).abs() < 1e-9);
        assert_eq!(summary.per_band_affected[&3], 0.0);
    }
}
