//! Iso-intensity contour extraction.
//!
//! Marching squares over the raster's cell-center lattice. Levels are never a
//! fixed list: they are generated from a base of 0.0 at a fixed interval up
//! to the raster maximum, so a raster peaking at 5.0 with the default 0.5
//! interval yields the 11 levels 0.0 through 5.0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geometry::Coordinate;
use crate::raster::IntensityRaster;
use crate::style;

pub const DEFAULT_INTERVAL: f64 = 0.5;
const LEVEL_BASE: f64 = 0.0;

#[derive(Debug, Error)]
pub enum ContourError {
    #[error("raster too small to contour: {width} x {height}")]
    DegenerateRaster { width: u32, height: u32 },
    #[error("raster holds no data cells to contour")]
    NoData,
}

/// One iso-intensity polyline with its presentation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourFeature {
    pub id: u32,
    pub intensity_level: f64,
    pub vertices: Vec<Coordinate>,
    pub label_x: f64,
    pub label_y: f64,
    pub color_hex: String,
    pub roman_label: String,
    pub horizontal_align: String,
    pub vertical_align: String,
    pub length: f64,
}

/// Levels from the base upwards at `interval` steps, last one <= `max`.
pub fn contour_levels(max: f64, interval: f64) -> Vec<f64> {
    let mut levels = Vec::new();
    if interval <= 0.0 || !max.is_finite() {
        return levels;
    }
    let mut step = 0u32;
    loop {
        let level = LEVEL_BASE + step as f64 * interval;
        if level > max + 1e-9 {
            break;
        }
        levels.push(level);
        step += 1;
    }
    levels
}

/// Extract contour features from a raster at the given interval.
pub fn extract_contours(
    raster: &IntensityRaster,
    interval: f64,
) -> Result<Vec<ContourFeature>, ContourError> {
    if raster.width() < 2 || raster.height() < 2 {
        return Err(ContourError::DegenerateRaster {
            width: raster.width(),
            height: raster.height(),
        });
    }
    let max = raster.max_value().ok_or(ContourError::NoData)?;
    let levels = contour_levels(max, interval);
    debug!(levels = levels.len(), "contour extraction requested");

    let mut features = Vec::new();
    let mut next_id = 0u32;
    for level in levels {
        for polyline in trace_level(raster, level) {
            features.push(build_feature(next_id, level, polyline));
            next_id += 1;
        }
    }
    Ok(features)
}

fn build_feature(id: u32, level: f64, vertices: Vec<Coordinate>) -> ContourFeature {
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    let mut min_lat = f64::INFINITY;
    for vertex in &vertices {
        min_lon = min_lon.min(vertex.lon);
        max_lon = max_lon.max(vertex.lon);
        min_lat = min_lat.min(vertex.lat);
    }
    let length = vertices
        .windows(2)
        .map(|pair| pair[0].squared_distance_to(pair[1]).sqrt())
        .sum();
    // Roman numerals are reserved for whole-number levels 1 and up.
    let roman_label = if level.fract() == 0.0 && level >= 1.0 {
        style::romanize(level).unwrap_or("").to_string()
    } else {
        String::new()
    };
    ContourFeature {
        id,
        intensity_level: level,
        label_x: (min_lon + max_lon) / 2.0,
        label_y: min_lat,
        color_hex: style::mmi_color(level).to_string(),
        roman_label,
        horizontal_align: "center".to_string(),
        vertical_align: "half".to_string(),
        length,
        vertices,
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: Coordinate,
    b: Coordinate,
}

/// Marching squares for one level: emit crossing segments per 2x2 node
/// block, then stitch shared endpoints into polylines.
fn trace_level(raster: &IntensityRaster, level: f64) -> Vec<Vec<Coordinate>> {
    let no_data = raster.no_data_value();
    let mut segments = Vec::new();

    for row in 0..raster.height() - 1 {
        for col in 0..raster.width() - 1 {
            let v_tl = raster.value(row, col);
            let v_tr = raster.value(row, col + 1);
            let v_br = raster.value(row + 1, col + 1);
            let v_bl = raster.value(row + 1, col);
            if [v_tl, v_tr, v_br, v_bl]
                .iter()
                .any(|v| *v == no_data || !v.is_finite())
            {
                continue;
            }
            let p_tl = raster.cell_center(row, col);
            let p_tr = raster.cell_center(row, col + 1);
            let p_br = raster.cell_center(row + 1, col + 1);
            let p_bl = raster.cell_center(row + 1, col);

            let top = || edge_point(p_tl, v_tl, p_tr, v_tr, level);
            let right = || edge_point(p_tr, v_tr, p_br, v_br, level);
            let bottom = || edge_point(p_bl, v_bl, p_br, v_br, level);
            let left = || edge_point(p_tl, v_tl, p_bl, v_bl, level);

            let mut case = 0u8;
            if v_tl >= level {
                case |= 8;
            }
            if v_tr >= level {
                case |= 4;
            }
            if v_br >= level {
                case |= 2;
            }
            if v_bl >= level {
                case |= 1;
            }

            match case {
                0 | 15 => {}
                1 | 14 => segments.push(Segment {
                    a: left(),
                    b: bottom(),
                }),
                2 | 13 => segments.push(Segment {
                    a: bottom(),
                    b: right(),
                }),
                3 | 12 => segments.push(Segment {
                    a: left(),
                    b: right(),
                }),
                4 | 11 => segments.push(Segment {
                    a: top(),
                    b: right(),
                }),
                6 | 9 => segments.push(Segment {
                    a: top(),
                    b: bottom(),
                }),
                7 | 8 => segments.push(Segment {
                    a: left(),
                    b: top(),
                }),
                5 => {
                    segments.push(Segment {
                        a: left(),
                        b: bottom(),
                    });
                    segments.push(Segment {
                        a: top(),
                        b: right(),
                    });
                }
                10 => {
                    segments.push(Segment {
                        a: left(),
                        b: top(),
                    });
                    segments.push(Segment {
                        a: bottom(),
                        b: right(),
                    });
                }
                _ => unreachable!(),
            }
        }
    }

    stitch(segments)
}

/// Linear interpolation of the level crossing along one lattice edge.
fn edge_point(pa: Coordinate, va: f64, pb: Coordinate, vb: f64, level: f64) -> Coordinate {
    let t = if (vb - va).abs() < f64::EPSILON {
        0.5
    } else {
        ((level - va) / (vb - va)).clamp(0.0, 1.0)
    };
    Coordinate::new(pa.lon + (pb.lon - pa.lon) * t, pa.lat + (pb.lat - pa.lat) * t)
}

fn quantize(point: Coordinate) -> (i64, i64) {
    const SCALE: f64 = 1e9;
    ((point.lon * SCALE).round() as i64, (point.lat * SCALE).round() as i64)
}

/// Chain segments that share endpoints into polylines. Walks both directions
/// from a seed segment; leftover branches start new polylines.
fn stitch(segments: Vec<Segment>) -> Vec<Vec<Coordinate>> {
    let mut by_endpoint: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (index, segment) in segments.iter().enumerate() {
        by_endpoint.entry(quantize(segment.a)).or_default().push(index);
        by_endpoint.entry(quantize(segment.b)).or_default().push(index);
    }

    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for seed in 0..segments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut chain = vec![segments[seed].a, segments[seed].b];

        // Extend forward from the tail, then backward from the head.
        loop {
            let tail = *chain.last().expect("chain is never empty");
            match take_neighbor(&segments, &by_endpoint, &mut used, tail) {
                Some(next) => chain.push(next),
                None => break,
            }
        }
        loop {
            let head = chain[0];
            match take_neighbor(&segments, &by_endpoint, &mut used, head) {
                Some(next) => chain.insert(0, next),
                None => break,
            }
        }
        polylines.push(chain);
    }
    polylines
}

/// Claim an unused segment incident to `point` and return its far endpoint.
fn take_neighbor(
    segments: &[Segment],
    by_endpoint: &HashMap<(i64, i64), Vec<usize>>,
    used: &mut [bool],
    point: Coordinate,
) -> Option<Coordinate> {
    let key = quantize(point);
    for &index in by_endpoint.get(&key)? {
        if used[index] {
            continue;
        }
        used[index] = true;
        let segment = segments[index];
        return if quantize(segment.a) == key {
            Some(segment.b)
        } else {
            Some(segment.a)
        };
    }
    None
}
