//! Validation worklists for classified earth-observation rasters.
//!
//! [`StratifiedPointSampler`] turns a categorical raster into a set of points
//! for human review, sized by the Olofsson formula or a fixed count and
//! allocated per class. Reading rasters and storing annotated points is left
//! to the caller.

pub mod allocation;
pub mod config;
pub mod coords;
pub mod error;
pub mod points;
pub mod raster;
pub mod sampler;
pub mod stats;

pub use allocation::{required_sample_size, Quota, SampleAllocation};
pub use config::SamplerConfig;
pub use coords::{Crs, LatLon};
pub use error::{Result, SamplingError};
pub use points::{Annotation, Confidence, Judgment, ReviewCursor, ValidationPoint, ValidationPointSet};
pub use raster::{CategoricalRaster, GeoTransform};
pub use sampler::{SamplingPlan, StratifiedPointSampler};
pub use stats::{ClassStat, ClassStatistics};
