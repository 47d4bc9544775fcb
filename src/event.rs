//! The shake-event aggregate root and the pipeline that drives it.
//!
//! A [`ShakeEvent`] owns one parsed grid plus every artifact derived from
//! it: at most one intensity raster and one contour set per resampling
//! algorithm, one population-center list, one impact summary. Artifacts are
//! computed lazily and reused; recomputation happens only when the caller
//! forces it or nothing is cached for that key. Forcing the raster
//! invalidates everything downstream of it in the same pass.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cities::{search_cities, CitySearchOutcome, PopulationSource, SearchConfig};
use crate::contour::{extract_contours, ContourFeature, DEFAULT_INTERVAL};
use crate::grid::{parse_grid_document, EventRecord, GridParseError, ShakeGrid};
use crate::impact::{compute_impact, FatalityModel, ImpactSummary};
use crate::ranking::{rank_cities, Ranking, DEFAULT_ROW_COUNT};
use crate::raster::{GridInterpolator, IntensityRaster, RasterEngine, ResampleAlgorithm};
use crate::store::{Artifact, ArtifactStore, MemoryStore};
use crate::workspace::EventWorkspace;

const RASTER_PRODUCT: &str = "mmi";
const CONTOUR_PRODUCT: &str = "mmi-contours";
const IMPACT_PRODUCT: &str = "impact";

fn default_interpolation() -> String {
    "nearest".to_string()
}

fn default_contour_interval() -> f64 {
    DEFAULT_INTERVAL
}

fn default_ranking_rows() -> usize {
    DEFAULT_ROW_COUNT
}

/// Pipeline tunables, loadable from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_interpolation")]
    pub interpolation: String,
    #[serde(default = "default_contour_interval")]
    pub contour_interval: f64,
    #[serde(default = "default_ranking_rows")]
    pub ranking_rows: usize,
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interpolation: default_interpolation(),
            contour_interval: default_contour_interval(),
            ranking_rows: default_ranking_rows(),
            search: SearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn algorithm(&self) -> Result<ResampleAlgorithm> {
        Ok(ResampleAlgorithm::from_name(&self.interpolation)?)
    }
}

/// One earthquake event and its derived artifacts.
pub struct ShakeEvent {
    workspace: EventWorkspace,
    record: EventRecord,
    grid: ShakeGrid,
    rasters: HashMap<ResampleAlgorithm, IntensityRaster>,
    contours: HashMap<ResampleAlgorithm, Vec<ContourFeature>>,
    cities: Option<CitySearchOutcome>,
    impact: Option<ImpactSummary>,
}

impl ShakeEvent {
    /// Parse a grid document into a fresh event. Parsing is all-or-nothing;
    /// on failure no event exists.
    pub fn from_document(
        workspace: EventWorkspace,
        text: &str,
    ) -> Result<Self, GridParseError> {
        let (record, grid) = parse_grid_document(text)?;
        info!(event_id = workspace.event_id(), "shake event constructed");
        Ok(Self {
            workspace,
            record,
            grid,
            rasters: HashMap::new(),
            contours: HashMap::new(),
            cities: None,
            impact: None,
        })
    }

    pub fn workspace(&self) -> &EventWorkspace {
        &self.workspace
    }

    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    pub fn grid(&self) -> &ShakeGrid {
        &self.grid
    }

    pub fn cities(&self) -> Option<&CitySearchOutcome> {
        self.cities.as_ref()
    }

    pub fn impact(&self) -> Option<&ImpactSummary> {
        self.impact.as_ref()
    }

    /// Rank whatever the last city search produced. Tolerates a missing or
    /// empty search result.
    pub fn ranked_cities(&self, row_count: usize) -> Ranking {
        let cities = self
            .cities
            .as_ref()
            .map(|outcome| outcome.cities.clone())
            .unwrap_or_default();
        rank_cities(cities, row_count)
    }
}

/// Owns the pipeline collaborators and drives one event at a time.
pub struct Pipeline {
    engine: Box<dyn RasterEngine>,
    store: Box<dyn ArtifactStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            engine: Box::new(GridInterpolator::new()),
            store: Box::new(MemoryStore::new()),
            config,
        }
    }

    pub fn with_engine(mut self, engine: impl RasterEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    pub fn with_store(mut self, store: impl ArtifactStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The interpolated intensity surface for one algorithm. Cached per
    /// algorithm; `force` recomputes and invalidates every downstream
    /// artifact of that raster in the same pass.
    pub fn intensity_raster<'e>(
        &self,
        event: &'e mut ShakeEvent,
        algorithm: ResampleAlgorithm,
        force: bool,
    ) -> Result<&'e IntensityRaster> {
        if !force {
            if event.rasters.contains_key(&algorithm) {
                debug!(algorithm = algorithm.name(), "raster cache hit");
                return Ok(&event.rasters[&algorithm]);
            }
            let key = event.workspace.key(RASTER_PRODUCT, algorithm.name());
            if let Some(Artifact::Raster(raster)) = self.store.get(&key) {
                debug!(algorithm = algorithm.name(), "raster store hit");
                return Ok(event.rasters.entry(algorithm).or_insert(raster));
            }
        } else {
            self.invalidate_downstream(event, algorithm);
        }

        let raster = self.engine.interpolate(&event.grid, algorithm)?;
        let key = event.workspace.key(RASTER_PRODUCT, algorithm.name());
        self.store
            .put(key, Artifact::Raster(raster.clone()))
            .context("Failed to persist intensity raster")?;
        Ok(event.rasters.entry(algorithm).or_insert(raster))
    }

    /// Iso-intensity contours for one algorithm's raster.
    pub fn contours<'e>(
        &self,
        event: &'e mut ShakeEvent,
        algorithm: ResampleAlgorithm,
        force: bool,
    ) -> Result<&'e [ContourFeature]> {
        if !force && event.contours.contains_key(&algorithm) {
            debug!(algorithm = algorithm.name(), "contour cache hit");
            return Ok(&event.contours[&algorithm]);
        }
        let key = event.workspace.key(CONTOUR_PRODUCT, algorithm.name());
        if !force {
            if let Some(Artifact::Contours(features)) = self.store.get(&key) {
                debug!(algorithm = algorithm.name(), "contour store hit");
                return Ok(event.contours.entry(algorithm).or_insert(features));
            }
        }

        // Stale same-named artifact goes first; a partial failure here is
        // logged and ignored, the regenerated artifact supersedes it anyway.
        if let Err(err) = self.store.remove(&key) {
            warn!(%err, "failed to remove stale contour artifact");
        }

        self.intensity_raster(event, algorithm, force)?;
        let raster = &event.rasters[&algorithm];
        let features = extract_contours(raster, self.config.contour_interval)?;
        self.store
            .put(key, Artifact::Contours(features.clone()))
            .context("Failed to persist contour set")?;
        Ok(event.contours.entry(algorithm).or_insert(features))
    }

    /// Expanding city search over the current raster.
    pub fn search_cities<'e>(
        &self,
        event: &'e mut ShakeEvent,
        source: &dyn PopulationSource,
        algorithm: ResampleAlgorithm,
        force: bool,
    ) -> Result<&'e CitySearchOutcome> {
        if !force && event.cities.is_some() {
            debug!("city search cache hit");
            return Ok(event.cities.as_ref().expect("just checked"));
        }
        self.intensity_raster(event, algorithm, force)?;
        let raster = &event.rasters[&algorithm];
        let epicenter = event.record.epicenter;
        let outcome = search_cities(raster, epicenter, source, &self.config.search);
        Ok(event.cities.insert(outcome))
    }

    /// Co-register against an exposure layer and aggregate impact counts.
    pub fn compute_impact<'e>(
        &self,
        event: &'e mut ShakeEvent,
        exposure: &IntensityRaster,
        model: &dyn FatalityModel,
        algorithm: ResampleAlgorithm,
        force: bool,
    ) -> Result<&'e ImpactSummary> {
        if !force && event.impact.is_some() {
            debug!("impact cache hit");
            return Ok(event.impact.as_ref().expect("just checked"));
        }
        self.intensity_raster(event, algorithm, force)?;
        let raster = &event.rasters[&algorithm];
        let summary = compute_impact(raster, exposure, model)?;
        let key = event.workspace.key(IMPACT_PRODUCT, algorithm.name());
        self.store
            .put(key, Artifact::Impact(summary.clone()))
            .context("Failed to persist impact summary")?;
        Ok(event.impact.insert(summary))
    }

    /// Drop every artifact derived from one algorithm's raster, in memory
    /// and in the store.
    fn invalidate_downstream(&self, event: &mut ShakeEvent, algorithm: ResampleAlgorithm) {
        debug!(
            algorithm = algorithm.name(),
            "invalidating downstream artifacts"
        );
        event.rasters.remove(&algorithm);
        event.contours.remove(&algorithm);
        event.cities = None;
        event.impact = None;
        for product in [RASTER_PRODUCT, CONTOUR_PRODUCT, IMPACT_PRODUCT] {
            let key = event.workspace.key(product, algorithm.name());
            if let Err(err) = self.store.remove(&key) {
                warn!(%err, product, "failed to remove stale artifact");
            }
        }
    }
}
