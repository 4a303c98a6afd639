//! Per-class statistics of a classification raster: pixel counts,
//! proportions and the standard deviation implied by each class's expected
//! accuracy.

use std::collections::BTreeMap;

use crate::error::{Result, SamplingError};

/// Statistics of a single stratum.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStat {
    pub class: u32,
    pub count: usize,
    /// Share of all valid pixels, 0-1.
    pub proportion: f64,
    pub accuracy: f64,
    /// `sqrt(accuracy * (1 - accuracy))`.
    pub standard_deviation: f64,
}

/// Statistics of every observed stratum, in ascending label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStatistics {
    pub classes: Vec<ClassStat>,
    /// Number of valid pixels.
    pub total: usize,
}

/// Shift labels down by one when the smallest label is above zero, so that
/// products labelled 1..=n line up with accuracies indexed 0..n.
/// Only a single step is applied. Returns whether the shift happened.
pub fn normalize_labels(labels: &mut [u32]) -> bool {
    let min = labels.iter().copied().min().unwrap_or(0);
    if min == 0 {
        return false;
    }
    labels.iter_mut().for_each(|l| *l -= 1);
    true
}

/// Resize the accuracy list to `max_label + 1` entries when it does not match.
///
/// The first value is repeated for every class, which discards any per-class
/// calibration the caller supplied; a warning is logged whenever it fires.
pub fn broadcast_accuracies(accuracies: &[f64], max_label: u32) -> Result<Vec<f64>> {
    let Some(&first) = accuracies.first() else {
        return Err(SamplingError::Configuration(
            "expected_accuracies must not be empty".into(),
        ));
    };
    let wanted = max_label as usize + 1;
    if accuracies.len() == wanted {
        return Ok(accuracies.to_vec());
    }
    log::warn!(
        "expected_accuracies has {} entries but labels run 0..={}; \
         broadcasting {} to all {} classes (per-class values are discarded)",
        accuracies.len(),
        max_label,
        first,
        wanted
    );
    Ok(vec![first; wanted])
}

impl ClassStatistics {
    /// Count labels and attach accuracies (indexed by label).
    pub fn from_labels<I>(labels: I, accuracies: &[f64]) -> Result<Self>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for label in labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        let total: usize = counts.values().sum();
        if total == 0 {
            return Err(SamplingError::InvalidRaster("no valid pixels to classify".into()));
        }

        let mut classes = Vec::with_capacity(counts.len());
        for (class, count) in counts {
            let accuracy = *accuracies.get(class as usize).ok_or_else(|| {
                SamplingError::Configuration(format!(
                    "no expected accuracy for class {class} ({} provided)",
                    accuracies.len()
                ))
            })?;
            if !(accuracy > 0.0 && accuracy < 1.0) {
                return Err(SamplingError::Configuration(format!(
                    "expected accuracy {accuracy} for class {class} is outside (0, 1)"
                )));
            }
            classes.push(ClassStat {
                class,
                count,
                proportion: count as f64 / total as f64,
                accuracy,
                standard_deviation: (accuracy * (1.0 - accuracy)).sqrt(),
            });
        }

        log::debug!(
            "class statistics over {total} px: {:?}",
            classes.iter().map(|c| (c.class, c.count)).collect::<Vec<_>>()
        );
        Ok(Self { classes, total })
    }

    pub fn max_class(&self) -> Option<u32> {
        self.classes.last().map(|c| c.class)
    }

    pub fn get(&self, class: u32) -> Option<&ClassStat> {
        self.classes.iter().find(|c| c.class == class)
    }
}
