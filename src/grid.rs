//! Shake-grid document parsing.
//!
//! The grid document is the USGS shakemap `grid.xml` shape: an `<event>`
//! element with the origin record, a `<grid_specification>` with the bounding
//! box and lattice dimensions, one `<grid_field>` per data column, and a
//! `<grid_data>` body of whitespace-separated sample rows. The parser is
//! total-or-nothing: any missing element, attribute, or non-numeric token
//! fails the whole parse and no partially populated grid escapes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{Coordinate, Rectangle};

/// Coordinate tolerance when checking samples against the declared bounds.
const BOUNDS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum GridParseError {
    #[error("unable to read grid document: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing element '{0}' in grid document")]
    MissingElement(String),
    #[error("missing attribute '{path}'")]
    MissingAttribute { path: String },
    #[error("unable to parse number from '{value}' at '{path}'")]
    BadNumber { path: String, value: String },
    #[error("unable to parse timestamp from '{0}'")]
    BadTimestamp(String),
    #[error("grid field '{0}' not declared in the column schema")]
    MissingField(String),
    #[error("grid dimensions must be positive, got {rows} rows x {columns} columns")]
    EmptyGrid { rows: u32, columns: u32 },
    #[error("expected {expected} samples ({rows} rows x {columns} columns), got {actual}")]
    SampleCount {
        expected: usize,
        actual: usize,
        rows: u32,
        columns: u32,
    },
    #[error("sample line {line} has no token for column {column} ('{field}')")]
    ShortSampleLine {
        line: usize,
        column: usize,
        field: String,
    },
    #[error("sample ({lon}, {lat}) on line {line} lies outside the grid bounds")]
    SampleOutOfBounds { lon: f64, lat: f64, line: usize },
}

/// One scattered intensity sample from the grid data body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSample {
    pub lon: f64,
    pub lat: f64,
    pub intensity: f64,
}

/// The event origin record carried alongside the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub magnitude: f64,
    pub depth_km: f64,
    pub epicenter: Coordinate,
    pub location: String,
    pub origin_time: NaiveDateTime,
    pub time_zone: String,
}

/// Maps logical field names to data column positions. Built once from the
/// declared `grid_field` elements and validated at load time; samples are
/// then read through the resolved indexes, never through fixed positions.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    columns: Vec<String>,
    lon: usize,
    lat: usize,
    intensity: usize,
}

impl FieldSchema {
    pub fn from_columns(columns: Vec<String>) -> Result<Self, GridParseError> {
        let lon = Self::locate(&columns, "LON")?;
        let lat = Self::locate(&columns, "LAT")?;
        let intensity = Self::locate(&columns, "MMI")?;
        Ok(Self {
            columns,
            lon,
            lat,
            intensity,
        })
    }

    fn locate(columns: &[String], name: &str) -> Result<usize, GridParseError> {
        columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| GridParseError::MissingField(name.to_string()))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn field_name(&self, column: usize) -> &str {
        &self.columns[column]
    }
}

/// Immutable parsed representation of one shake-grid dataset.
#[derive(Debug, Clone)]
pub struct ShakeGrid {
    bounds: Rectangle,
    rows: u32,
    columns: u32,
    samples: Vec<GridSample>,
}

impl ShakeGrid {
    /// Assemble a grid, enforcing the structural invariants: positive
    /// dimensions, `rows x columns` samples, every sample inside the bounds.
    pub fn new(
        bounds: Rectangle,
        rows: u32,
        columns: u32,
        samples: Vec<GridSample>,
    ) -> Result<Self, GridParseError> {
        if rows == 0 || columns == 0 {
            return Err(GridParseError::EmptyGrid { rows, columns });
        }
        let expected = rows as usize * columns as usize;
        if samples.len() != expected {
            return Err(GridParseError::SampleCount {
                expected,
                actual: samples.len(),
                rows,
                columns,
            });
        }
        for (index, sample) in samples.iter().enumerate() {
            let inside = sample.lon >= bounds.x_min - BOUNDS_TOLERANCE
                && sample.lon <= bounds.x_max + BOUNDS_TOLERANCE
                && sample.lat >= bounds.y_min - BOUNDS_TOLERANCE
                && sample.lat <= bounds.y_max + BOUNDS_TOLERANCE;
            if !inside {
                return Err(GridParseError::SampleOutOfBounds {
                    lon: sample.lon,
                    lat: sample.lat,
                    line: index + 1,
                });
            }
        }
        Ok(Self {
            bounds,
            rows,
            columns,
            samples,
        })
    }

    pub fn bounds(&self) -> Rectangle {
        self.bounds
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn samples(&self) -> &[GridSample] {
        &self.samples
    }

    pub fn max_intensity(&self) -> f64 {
        self.samples
            .iter()
            .map(|sample| sample.intensity)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Parse a grid document into the event record and the shake grid.
pub fn parse_grid_document(text: &str) -> Result<(EventRecord, ShakeGrid), GridParseError> {
    debug!("grid document parse requested");
    let parser = DocumentParser::new(text);
    let record = parser.parse_event()?;
    let grid = parser.parse_grid()?;
    debug!(
        rows = grid.rows(),
        columns = grid.columns(),
        "grid document parsed"
    );
    Ok((record, grid))
}

/// Convenience wrapper for on-disk documents.
pub fn load_grid_document(
    path: impl AsRef<Path>,
) -> Result<(EventRecord, ShakeGrid), GridParseError> {
    let text = fs::read_to_string(path)?;
    parse_grid_document(&text)
}

struct DocumentParser<'a> {
    text: &'a str,
}

impl<'a> DocumentParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text }
    }

    fn parse_event(&self) -> Result<EventRecord, GridParseError> {
        let attributes = self
            .element_attributes("event")
            .into_iter()
            .next()
            .ok_or_else(|| GridParseError::MissingElement("event".to_string()))?;
        let magnitude = required_number(&attributes, "event", "magnitude")?;
        let depth_km = required_number(&attributes, "event", "depth")?;
        let lon = required_number(&attributes, "event", "lon")?;
        let lat = required_number(&attributes, "event", "lat")?;
        let location = required_attribute(&attributes, "event", "event_description")?
            .trim()
            .to_string();
        let stamp = required_attribute(&attributes, "event", "event_timestamp")?;
        let (origin_time, time_zone) = parse_event_timestamp(stamp)?;
        Ok(EventRecord {
            magnitude,
            depth_km,
            epicenter: Coordinate::new(lon, lat),
            location,
            origin_time,
            time_zone,
        })
    }

    fn parse_grid(&self) -> Result<ShakeGrid, GridParseError> {
        let spec = self
            .element_attributes("grid_specification")
            .into_iter()
            .next()
            .ok_or_else(|| GridParseError::MissingElement("grid_specification".to_string()))?;
        let element = "grid_specification";
        let x_min = required_number(&spec, element, "lon_min")?;
        let x_max = required_number(&spec, element, "lon_max")?;
        let y_min = required_number(&spec, element, "lat_min")?;
        let y_max = required_number(&spec, element, "lat_max")?;
        let columns = required_integer(&spec, element, "nlon")?;
        let rows = required_integer(&spec, element, "nlat")?;

        let schema = self.parse_schema()?;
        let bounds = Rectangle::new(x_min, y_min, x_max, y_max);
        let samples = self.parse_samples(&schema)?;
        ShakeGrid::new(bounds, rows, columns, samples)
    }

    /// Column names in declared index order. The declared `index` attribute
    /// is authoritative, so reordered `grid_field` elements parse the same.
    fn parse_schema(&self) -> Result<FieldSchema, GridParseError> {
        let fields = self.element_attributes("grid_field");
        if fields.is_empty() {
            return Err(GridParseError::MissingElement("grid_field".to_string()));
        }
        let mut indexed = Vec::with_capacity(fields.len());
        for attributes in &fields {
            let index = required_number(attributes, "grid_field", "index")? as usize;
            let name = required_attribute(attributes, "grid_field", "name")?.to_string();
            indexed.push((index, name));
        }
        indexed.sort_by_key(|(index, _)| *index);
        FieldSchema::from_columns(indexed.into_iter().map(|(_, name)| name).collect())
    }

    fn parse_samples(&self, schema: &FieldSchema) -> Result<Vec<GridSample>, GridParseError> {
        let body = self
            .element_body("grid_data")
            .ok_or_else(|| GridParseError::MissingElement("grid_data".to_string()))?;
        let mut samples = Vec::new();
        for (line_index, line) in body.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            let lon = sample_token(schema, &tokens, line_index + 1, schema.lon)?;
            let lat = sample_token(schema, &tokens, line_index + 1, schema.lat)?;
            let intensity = sample_token(schema, &tokens, line_index + 1, schema.intensity)?;
            samples.push(GridSample {
                lon,
                lat,
                intensity,
            });
        }
        Ok(samples)
    }

    /// All attribute maps for elements with the given tag name.
    fn element_attributes(&self, tag: &str) -> Vec<HashMap<String, String>> {
        let open = format!("<{tag}");
        let mut found = Vec::new();
        let mut rest = self.text;
        while let Some(start) = rest.find(&open) {
            let after = &rest[start + open.len()..];
            // Reject prefix matches such as <grid_data> when scanning <grid>.
            let boundary = after.chars().next();
            if !matches!(boundary, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
                rest = &rest[start + open.len()..];
                continue;
            }
            match after.find('>') {
                Some(end) => {
                    found.push(parse_attributes(&after[..end]));
                    rest = &after[end..];
                }
                None => break,
            }
        }
        found
    }

    /// Text between `<tag...>` and `</tag>`.
    fn element_body(&self, tag: &str) -> Option<&'a str> {
        let open = format!("<{tag}");
        let close = format!("</{tag}>");
        let start = self.text.find(&open)?;
        let after_open = &self.text[start..];
        let body_start = after_open.find('>')? + 1;
        let body = &after_open[body_start..];
        let end = body.find(&close)?;
        Some(&body[..end])
    }
}

fn parse_attributes(element: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = element;
    while let Some(eq) = rest.find('=') {
        let name = rest[..eq].trim().trim_start_matches('/').trim();
        let after = rest[eq + 1..].trim_start();
        if let Some(stripped) = after.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                if !name.is_empty() {
                    attributes.insert(
                        name.rsplit(char::is_whitespace)
                            .next()
                            .unwrap_or(name)
                            .to_string(),
                        stripped[..end].to_string(),
                    );
                }
                rest = &stripped[end + 1..];
                continue;
            }
        }
        break;
    }
    attributes
}

fn required_attribute<'m>(
    attributes: &'m HashMap<String, String>,
    element: &str,
    name: &str,
) -> Result<&'m str, GridParseError> {
    attributes
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| GridParseError::MissingAttribute {
            path: format!("{element}/{name}"),
        })
}

fn required_number(
    attributes: &HashMap<String, String>,
    element: &str,
    name: &str,
) -> Result<f64, GridParseError> {
    let value = required_attribute(attributes, element, name)?;
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| GridParseError::BadNumber {
            path: format!("{element}/{name}"),
            value: value.to_string(),
        })
}

/// Lattice counts must be whole numbers; `"2.5"` rows is a malformed
/// document, not two rows.
fn required_integer(
    attributes: &HashMap<String, String>,
    element: &str,
    name: &str,
) -> Result<u32, GridParseError> {
    let value = required_attribute(attributes, element, name)?;
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| GridParseError::BadNumber {
            path: format!("{element}/{name}"),
            value: value.to_string(),
        })
}

fn sample_token(
    schema: &FieldSchema,
    tokens: &[&str],
    line: usize,
    column: usize,
) -> Result<f64, GridParseError> {
    let token = tokens
        .get(column)
        .ok_or_else(|| GridParseError::ShortSampleLine {
            line,
            column,
            field: schema.field_name(column).to_string(),
        })?;
    token.parse::<f64>().map_err(|_| GridParseError::BadNumber {
        path: format!("grid_data line {line} ({})", schema.field_name(column)),
        value: token.to_string(),
    })
}

fn parse_event_timestamp(stamp: &str) -> Result<(NaiveDateTime, String), GridParseError> {
    // e.g. 2012-08-07T01:55:12WIB - ISO datetime with a bare zone suffix.
    if stamp.len() < 19 || !stamp.is_char_boundary(19) {
        return Err(GridParseError::BadTimestamp(stamp.to_string()));
    }
    let (datetime_part, zone) = stamp.split_at(19);
    let origin_time = NaiveDateTime::parse_from_str(datetime_part, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| GridParseError::BadTimestamp(stamp.to_string()))?;
    Ok((origin_time, zone.trim().to_string()))
}
