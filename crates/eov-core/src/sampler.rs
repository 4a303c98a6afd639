//! Stratified validation-point sampling.
//!
//! With a reference raster the worklist is stratified by its classes: the
//! total comes from the Olofsson formula (or a fixed count) and each class
//! receives a proportional quota. Without one, pixels are drawn uniformly.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::allocation::{resolve_total, SampleAllocation};
use crate::config::SamplerConfig;
use crate::error::{Result, SamplingError};
use crate::points::{Annotation, ValidationPoint, ValidationPointSet};
use crate::raster::{CategoricalRaster, FlatRaster, LabeledPixel};
use crate::stats::{broadcast_accuracies, normalize_labels, ClassStatistics};

/// Stream constant for the unstratified draw.
const UNSTRATIFIED_STREAM: u64 = 0x3C6E_F372_FE94_F82B;
/// Multiplier spreading class labels across the seed space.
const CLASS_STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Statistics and quotas resolved for a stratified draw.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    pub statistics: ClassStatistics,
    pub allocation: SampleAllocation,
    /// Accuracies actually used, after any broadcast.
    pub accuracies: Vec<f64>,
    /// Whether labels were shifted down by one.
    pub labels_shifted: bool,
}

/// Turns classification rasters into validation worklists.
///
/// Holds only its configuration, so one sampler can serve concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct StratifiedPointSampler {
    config: SamplerConfig,
}

impl StratifiedPointSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Draw a worklist. Stratifies on `reference` when given, otherwise draws
    /// `n_points` pixels uniformly from `raster`.
    pub fn sample(
        &self,
        raster: &CategoricalRaster,
        reference: Option<&CategoricalRaster>,
    ) -> Result<ValidationPointSet> {
        self.sample_with_plan(raster, reference).map(|(points, _)| points)
    }

    /// Like [`sample`](Self::sample), also returning the plan behind a
    /// stratified draw (None for unstratified draws).
    pub fn sample_with_plan(
        &self,
        raster: &CategoricalRaster,
        reference: Option<&CategoricalRaster>,
    ) -> Result<(ValidationPointSet, Option<SamplingPlan>)> {
        self.config.validate()?;
        match reference {
            Some(reference) => {
                if reference.crs != raster.crs {
                    log::warn!(
                        "reference raster CRS {} differs from raster CRS {}",
                        reference.crs,
                        raster.crs
                    );
                }
                let (points, plan) = self.sample_stratified(reference)?;
                Ok((points, Some(plan)))
            }
            None => Ok((self.sample_unstratified(raster)?, None)),
        }
    }

    /// Resolve statistics and quotas for `reference` without drawing points.
    pub fn plan(&self, reference: &CategoricalRaster) -> Result<SamplingPlan> {
        self.config.validate()?;
        let flat = self.flatten(reference, Some(self.config.label_ceiling))?;
        let mut labels = labels_of(&flat.pixels);
        self.plan_labels(&mut labels)
    }

    fn plan_labels(&self, labels: &mut [u32]) -> Result<SamplingPlan> {
        let labels_shifted = normalize_labels(labels);
        if labels_shifted {
            log::debug!("labels start above 0; shifted down by one");
        }

        let max_label = labels.iter().copied().max().unwrap_or(0);
        let accuracies = broadcast_accuracies(&self.config.expected_accuracies, max_label)?;
        let statistics = ClassStatistics::from_labels(labels.iter().copied(), &accuracies)?;
        let total = resolve_total(&statistics, &self.config);
        let allocation = SampleAllocation::allocate(&statistics, total);
        allocation.check_feasible(&statistics)?;

        Ok(SamplingPlan { statistics, allocation, accuracies, labels_shifted })
    }

    fn sample_stratified(
        &self,
        reference: &CategoricalRaster,
    ) -> Result<(ValidationPointSet, SamplingPlan)> {
        let flat = self.flatten(reference, Some(self.config.label_ceiling))?;
        let mut labels = labels_of(&flat.pixels);
        let plan = self.plan_labels(&mut labels)?;

        let mut strata: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (pos, &label) in labels.iter().enumerate() {
            strata.entry(label).or_default().push(pos);
        }

        let mut kept = Vec::with_capacity(plan.allocation.total);
        for quota in &plan.allocation.quotas {
            let pool = &strata[&quota.class];
            let mut rng = StdRng::seed_from_u64(class_stream_seed(self.config.random_seed, quota.class));
            kept.extend(
                rand::seq::index::sample(&mut rng, pool.len(), quota.count)
                    .into_iter()
                    .map(|i| pool[i]),
            );
        }
        kept.sort_unstable();

        let points = kept
            .iter()
            .enumerate()
            .map(|(id, &pos)| point(id, &flat.pixels[pos], labels[pos]))
            .collect();

        log::info!(
            "drew {} stratified points over {} classes from {} valid pixels",
            plan.allocation.total,
            plan.statistics.classes.len(),
            plan.statistics.total
        );
        Ok((ValidationPointSet::new(flat.crs, points), plan))
    }

    /// Uniform draw. Only nodata and negative labels are excluded here; the
    /// label ceiling applies to stratification only.
    fn sample_unstratified(&self, raster: &CategoricalRaster) -> Result<ValidationPointSet> {
        let n_points = self.config.n_points.ok_or_else(|| {
            SamplingError::Configuration("n_points is required without a reference raster".into())
        })?;
        let flat = self.flatten(raster, None)?;
        let available = flat.pixels.len();
        if n_points > available {
            return Err(SamplingError::InsufficientPixels { class: None, quota: n_points, available });
        }

        let mut rng = StdRng::seed_from_u64(self.config.random_seed ^ UNSTRATIFIED_STREAM);
        let mut kept = rand::seq::index::sample(&mut rng, available, n_points).into_vec();
        kept.sort_unstable();

        let points = kept
            .iter()
            .enumerate()
            .map(|(id, &pos)| {
                let px = &flat.pixels[pos];
                point(id, px, px.label as u32)
            })
            .collect();

        log::info!("drew {n_points} unstratified points from {available} valid pixels");
        Ok(ValidationPointSet::new(flat.crs, points))
    }

    fn flatten(&self, raster: &CategoricalRaster, label_ceiling: Option<i32>) -> Result<FlatRaster> {
        let flat = raster.flatten(self.config.band, label_ceiling)?;
        if flat.pixels.is_empty() {
            return Err(SamplingError::InvalidRaster(
                "raster has no valid pixels after nodata filtering".into(),
            ));
        }
        Ok(flat)
    }
}

/// Independent PRNG stream per class so one stratum's draw does not depend
/// on the others.
fn class_stream_seed(seed: u64, class: u32) -> u64 {
    seed ^ (class as u64 + 1).wrapping_mul(CLASS_STREAM_MIX)
}

// Flattened pixels are already filtered to non-negative labels.
fn labels_of(pixels: &[LabeledPixel]) -> Vec<u32> {
    pixels.iter().map(|p| p.label as u32).collect()
}

fn point(id: usize, px: &LabeledPixel, class: u32) -> ValidationPoint {
    ValidationPoint {
        id,
        x: px.x,
        y: px.y,
        class: Some(class),
        annotation: Annotation::default(),
    }
}
