pub mod cities;
pub mod contour;
pub mod event;
pub mod geometry;
pub mod grid;
pub mod impact;
pub mod ranking;
pub mod raster;
pub mod store;
pub mod style;
pub mod workspace;

pub use cities::{CitySearchOutcome, PopulationCenter, PopulationSource, SearchBox, SearchConfig};
pub use contour::ContourFeature;
pub use event::{Pipeline, PipelineConfig, ShakeEvent};
pub use grid::{EventRecord, ShakeGrid};
pub use impact::{FatalityModel, ImpactSummary};
pub use ranking::Ranking;
pub use raster::{IntensityRaster, RasterEngine, ResampleAlgorithm};
pub use workspace::EventWorkspace;
