//! Planar geometry primitives shared across the pipeline.

use serde::{Deserialize, Serialize};

/// A longitude/latitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Squared planar distance in degrees. Good enough for ranking nearby
    /// places against a single epicenter; never used as a metric distance.
    pub fn squared_distance_to(&self, other: Coordinate) -> f64 {
        let dx = self.lon - other.lon;
        let dy = self.lat - other.lat;
        dx * dx + dy * dy
    }

    /// Compass bearing from this point towards `other`, degrees clockwise
    /// from north in `[0, 360)`.
    pub fn bearing_to(&self, other: Coordinate) -> f64 {
        let dx = other.lon - self.lon;
        let dy = other.lat - self.lat;
        let degrees = dx.atan2(dy).to_degrees();
        (degrees + 360.0) % 360.0
    }

    /// The reciprocal bearing, as seen from `other` back to this point.
    pub fn bearing_from(&self, other: Coordinate) -> f64 {
        (self.bearing_to(other) + 180.0) % 360.0
    }
}

/// An axis-aligned rectangle in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Rectangle {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Exact point-in-rectangle test; edges are inclusive.
    pub fn contains(&self, point: Coordinate) -> bool {
        point.lon >= self.x_min
            && point.lon <= self.x_max
            && point.lat >= self.y_min
            && point.lat <= self.y_max
    }

    /// Scale symmetrically about the rectangle's own center.
    pub fn scaled_about_center(&self, factor: f64) -> Rectangle {
        let center = self.center();
        let half_width = self.width() / 2.0 * factor;
        let half_height = self.height() / 2.0 * factor;
        Rectangle::new(
            center.lon - half_width,
            center.lat - half_height,
            center.lon + half_width,
            center.lat + half_height,
        )
    }
}
