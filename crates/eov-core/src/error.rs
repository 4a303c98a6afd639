use thiserror::Error;

/// Errors raised while turning a classification raster into a validation worklist.
#[derive(Debug, Error)]
pub enum SamplingError {
    /// The raster is unusable: no valid pixels, bad buffer size, missing band.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// A stratum (or the whole raster, when `class` is None) holds fewer
    /// pixels than the points requested from it.
    #[error("insufficient pixels{}: quota {quota} exceeds {available} available", class_suffix(.class))]
    InsufficientPixels {
        class: Option<u32>,
        quota: usize,
        available: usize,
    },

    /// Sampler parameters that cannot produce a valid allocation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A judgment referenced a point id that is not in the set.
    #[error("unknown validation point id {0}")]
    UnknownPoint(usize),
}

fn class_suffix(class: &Option<u32>) -> String {
    match class {
        Some(c) => format!(" in class {c}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, SamplingError>;
