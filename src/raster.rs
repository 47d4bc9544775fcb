//! Regular intensity rasters and the scattered-sample interpolation engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geometry::{Coordinate, Rectangle};
use crate::grid::ShakeGrid;

pub const NO_DATA: f64 = -9999.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("unknown resampling algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("raster dimensions must be positive, got {width} x {height}")]
    EmptyRaster { width: u32, height: u32 },
    #[error("expected {expected} raster values, got {actual}")]
    ValueCount { expected: usize, actual: usize },
    #[error("source grid has no samples to interpolate")]
    NoSamples,
}

/// Selectable resampling algorithm. `nearest` is the default and the only
/// one expected to reproduce the source dataset's implicit resolution
/// bit-exactly; the others are provided for smoother cartography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResampleAlgorithm {
    Nearest,
    InverseDistance,
    Average,
}

impl ResampleAlgorithm {
    pub fn from_name(name: &str) -> Result<Self, RasterError> {
        match name {
            "nearest" => Ok(Self::Nearest),
            "invdist" => Ok(Self::InverseDistance),
            "average" => Ok(Self::Average),
            other => Err(RasterError::UnknownAlgorithm(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::InverseDistance => "invdist",
            Self::Average => "average",
        }
    }
}

impl Default for ResampleAlgorithm {
    fn default() -> Self {
        Self::Nearest
    }
}

/// A regular gridded intensity surface. Row 0 is the northern edge; values
/// are row-major with `NO_DATA` marking holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityRaster {
    origin_x: f64,
    origin_y: f64,
    cell_size_x: f64,
    cell_size_y: f64,
    width: u32,
    height: u32,
    no_data: f64,
    values: Vec<f64>,
}

impl IntensityRaster {
    pub fn new(
        extent: Rectangle,
        width: u32,
        height: u32,
        values: Vec<f64>,
    ) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyRaster { width, height });
        }
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(RasterError::ValueCount {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            origin_x: extent.x_min,
            origin_y: extent.y_max,
            cell_size_x: extent.width() / width as f64,
            cell_size_y: extent.height() / height as f64,
            width,
            height,
            no_data: NO_DATA,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_size_x(&self) -> f64 {
        self.cell_size_x
    }

    pub fn cell_size_y(&self) -> f64 {
        self.cell_size_y
    }

    pub fn no_data_value(&self) -> f64 {
        self.no_data
    }

    pub fn extent(&self) -> Rectangle {
        Rectangle::new(
            self.origin_x,
            self.origin_y - self.cell_size_y * self.height as f64,
            self.origin_x + self.cell_size_x * self.width as f64,
            self.origin_y,
        )
    }

    /// Geographic center of the cell at (row, col).
    pub fn cell_center(&self, row: u32, col: u32) -> Coordinate {
        Coordinate::new(
            self.origin_x + (col as f64 + 0.5) * self.cell_size_x,
            self.origin_y - (row as f64 + 0.5) * self.cell_size_y,
        )
    }

    pub fn value(&self, row: u32, col: u32) -> f64 {
        self.values[row as usize * self.width as usize + col as usize]
    }

    /// Value of the cell covering a coordinate. `None` outside the extent or
    /// where the cell holds the no-data marker.
    pub fn sample(&self, point: Coordinate) -> Option<f64> {
        let col = (point.lon - self.origin_x) / self.cell_size_x;
        let row = (self.origin_y - point.lat) / self.cell_size_y;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as u32, row as u32);
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.value(row, col);
        if value == self.no_data {
            None
        } else {
            Some(value)
        }
    }

    /// Maximum data value, ignoring no-data cells. `None` when every cell is
    /// a hole.
    pub fn max_value(&self) -> Option<f64> {
        let max = self
            .values
            .iter()
            .copied()
            .filter(|v| *v != self.no_data && v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if max.is_finite() {
            Some(max)
        } else {
            None
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Capability seam for raster production, so the pipeline depends on an
/// abstract engine rather than a particular geospatial toolchain.
pub trait RasterEngine {
    fn interpolate(
        &self,
        grid: &ShakeGrid,
        algorithm: ResampleAlgorithm,
    ) -> Result<IntensityRaster, RasterError>;
}

/// Built-in engine working directly on the scattered samples.
#[derive(Debug, Default)]
pub struct GridInterpolator;

impl GridInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl RasterEngine for GridInterpolator {
    fn interpolate(
        &self,
        grid: &ShakeGrid,
        algorithm: ResampleAlgorithm,
    ) -> Result<IntensityRaster, RasterError> {
        debug!(algorithm = algorithm.name(), "raster interpolation requested");
        let samples = grid.samples();
        if samples.is_empty() {
            return Err(RasterError::NoSamples);
        }
        let width = grid.columns();
        let height = grid.rows();
        let extent = grid.bounds();
        let cell_size_x = extent.width() / width as f64;
        let cell_size_y = extent.height() / height as f64;
        // One nominal cell, used as the neighborhood radius for `average`.
        let radius2 = {
            let r = cell_size_x.max(cell_size_y);
            r * r
        };

        let mut values = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            let y = extent.y_max - (row as f64 + 0.5) * cell_size_y;
            for col in 0..width {
                let x = extent.x_min + (col as f64 + 0.5) * cell_size_x;
                let value = match algorithm {
                    ResampleAlgorithm::Nearest => nearest(samples, x, y),
                    ResampleAlgorithm::InverseDistance => inverse_distance(samples, x, y),
                    ResampleAlgorithm::Average => average(samples, x, y, radius2),
                };
                values.push(value);
            }
        }
        IntensityRaster::new(extent, width, height, values)
    }
}

/// Nearest-sample selection. Ties break to the earliest sample in source
/// order (strict less-than while scanning), matching the selection order the
/// rest of the pipeline was calibrated against.
fn nearest(samples: &[crate::grid::GridSample], x: f64, y: f64) -> f64 {
    let mut best = f64::INFINITY;
    let mut value = NO_DATA;
    for sample in samples {
        let dx = sample.lon - x;
        let dy = sample.lat - y;
        let d2 = dx * dx + dy * dy;
        if d2 < best {
            best = d2;
            value = sample.intensity;
        }
    }
    value
}

/// Inverse-distance weighting, power fixed at 2.0 and smoothing fixed at
/// 1.0; no other parameters are exposed.
fn inverse_distance(samples: &[crate::grid::GridSample], x: f64, y: f64) -> f64 {
    const SMOOTHING: f64 = 1.0;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for sample in samples {
        let dx = sample.lon - x;
        let dy = sample.lat - y;
        let weight = 1.0 / (dx * dx + dy * dy + SMOOTHING * SMOOTHING);
        numerator += weight * sample.intensity;
        denominator += weight;
    }
    if denominator == 0.0 {
        NO_DATA
    } else {
        numerator / denominator
    }
}

fn average(samples: &[crate::grid::GridSample], x: f64, y: f64, radius2: f64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0_u32;
    for sample in samples {
        let dx = sample.lon - x;
        let dy = sample.lat - y;
        if dx * dx + dy * dy <= radius2 {
            sum += sample.intensity;
            count += 1;
        }
    }
    if count == 0 {
        NO_DATA
    } else {
        sum / count as f64
    }
}
