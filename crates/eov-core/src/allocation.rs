//! Sample size and per-class quota allocation.
//!
//! The total follows Olofsson et al. (2014) for a target standard error of
//! overall accuracy:
//!
//! ```text
//! n = ( Σ_c W_c · S_c / S(Ô) )²      S_c = sqrt(U_c · (1 - U_c))
//! ```
//!
//! Quotas are proportional and floor-rounded. The rounding remainder is not
//! apportioned: any deficit goes to the lowest class label, any surplus is
//! taken from the largest quota. That policy is kept for compatibility with
//! existing worklists even though largest-remainder apportionment would
//! spread it more evenly.

use crate::config::SamplerConfig;
use crate::error::{Result, SamplingError};
use crate::stats::ClassStatistics;

/// Olofsson sample size for the given statistics and target standard error.
/// Rounds half to even.
pub fn required_sample_size(stats: &ClassStatistics, expected_standard_error: f64) -> usize {
    let weighted: f64 = stats
        .classes
        .iter()
        .map(|c| c.proportion * c.standard_deviation)
        .sum();
    (weighted / expected_standard_error).powi(2).round_ties_even() as usize
}

/// Fixed `n_points` when configured, the Olofsson size otherwise.
pub fn resolve_total(stats: &ClassStatistics, cfg: &SamplerConfig) -> usize {
    match cfg.n_points {
        Some(n) => n,
        None => required_sample_size(stats, cfg.expected_standard_error),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub class: u32,
    pub count: usize,
}

/// Points to draw from each stratum; always sums to `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleAllocation {
    /// Ascending label order, one entry per observed class.
    pub quotas: Vec<Quota>,
    pub total: usize,
}

impl SampleAllocation {
    pub fn allocate(stats: &ClassStatistics, total: usize) -> Self {
        let mut quotas: Vec<Quota> = stats
            .classes
            .iter()
            .map(|c| Quota {
                class: c.class,
                // floor(proportion * total) without float error.
                count: (c.count as u128 * total as u128 / stats.total as u128) as usize,
            })
            .collect();

        let assigned: usize = quotas.iter().map(|q| q.count).sum();
        if assigned < total {
            if let Some(lowest) = quotas.first_mut() {
                lowest.count += total - assigned;
            }
        } else if assigned > total {
            // First maximum wins ties.
            let mut largest = 0;
            for (i, q) in quotas.iter().enumerate() {
                if q.count > quotas[largest].count {
                    largest = i;
                }
            }
            quotas[largest].count = quotas[largest].count.saturating_sub(assigned - total);
        }

        log::debug!(
            "allocated {total} points: {:?}",
            quotas.iter().map(|q| (q.class, q.count)).collect::<Vec<_>>()
        );
        Self { quotas, total }
    }

    pub fn quota(&self, class: u32) -> Option<usize> {
        self.quotas.iter().find(|q| q.class == class).map(|q| q.count)
    }

    /// Fails when any quota exceeds the pixels available in its stratum.
    pub fn check_feasible(&self, stats: &ClassStatistics) -> Result<()> {
        for q in &self.quotas {
            let available = stats.get(q.class).map_or(0, |c| c.count);
            if q.count > available {
                return Err(SamplingError::InsufficientPixels {
                    class: Some(q.class),
                    quota: q.count,
                    available,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(spec: &[(u32, usize)], acc: f64) -> ClassStatistics {
        let labels: Vec<u32> = spec.iter().flat_map(|&(c, n)| std::iter::repeat(c).take(n)).collect();
        let max = spec.iter().map(|&(c, _)| c).max().unwrap_or(0);
        ClassStatistics::from_labels(labels, &vec![acc; max as usize + 1]).unwrap()
    }

    fn counts(a: &SampleAllocation) -> Vec<usize> {
        a.quotas.iter().map(|q| q.count).collect()
    }

    #[test]
    fn olofsson_two_class_scenario() {
        let s = stats(&[(0, 700), (1, 300)], 0.9);
        let n = required_sample_size(&s, 0.01);
        assert_eq!(n, 900);
        let a = SampleAllocation::allocate(&s, n);
        assert_eq!(counts(&a), vec![630, 270]);
        assert_eq!(a.quotas.iter().map(|q| q.count).sum::<usize>(), 900);
        a.check_feasible(&s).unwrap();
    }

    #[test]
    fn fixed_count_overrides_formula() {
        let s = stats(&[(0, 700), (1, 300)], 0.9);
        let cfg = SamplerConfig { n_points: Some(50), ..Default::default() };
        let n = resolve_total(&s, &cfg);
        assert_eq!(n, 50);
        assert_eq!(counts(&SampleAllocation::allocate(&s, n)), vec![35, 15]);
    }

    #[test]
    fn deficit_goes_to_lowest_class() {
        let s = stats(&[(0, 10), (1, 10), (2, 10)], 0.9);
        let a = SampleAllocation::allocate(&s, 10);
        // floor(10/3) = 3 each, deficit 1.
        assert_eq!(counts(&a), vec![4, 3, 3]);
    }

    #[test]
    fn deficit_goes_to_lowest_observed_label() {
        let s = stats(&[(1, 5), (3, 5)], 0.9);
        let a = SampleAllocation::allocate(&s, 3);
        assert_eq!(a.quota(1), Some(2));
        assert_eq!(a.quota(3), Some(1));
    }

    #[test]
    fn single_class_needs_no_adjustment() {
        let s = stats(&[(0, 40)], 0.8);
        let a = SampleAllocation::allocate(&s, 25);
        assert_eq!(counts(&a), vec![25]);
    }

    #[test]
    fn adjusted_quota_beyond_stratum_is_rejected() {
        // floors are all 0; the whole deficit of 2 lands on class 0 which has 1 pixel.
        let s = stats(&[(0, 1), (1, 1), (2, 1)], 0.9);
        let a = SampleAllocation::allocate(&s, 2);
        assert_eq!(counts(&a), vec![2, 0, 0]);
        match a.check_feasible(&s) {
            Err(SamplingError::InsufficientPixels { class, quota, available }) => {
                assert_eq!(class, Some(0));
                assert_eq!(quota, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientPixels, got {other:?}"),
        }
    }

    #[test]
    fn tighter_standard_error_needs_more_points() {
        let s = stats(&[(0, 500), (1, 500)], 0.9);
        assert!(required_sample_size(&s, 0.005) > required_sample_size(&s, 0.01));
        // (0.3 / 0.02)^2 = 225
        assert_eq!(required_sample_size(&s, 0.02), 225);
    }

    proptest! {
        #[test]
        fn quotas_sum_to_total(
            class_counts in prop::collection::vec(1usize..500, 1..8),
            frac in 0.0f64..=1.0,
        ) {
            let spec: Vec<(u32, usize)> = class_counts.iter().enumerate().map(|(i, &n)| (i as u32, n)).collect();
            let s = stats(&spec, 0.9);
            let total = (s.total as f64 * frac) as usize;
            let a = SampleAllocation::allocate(&s, total);
            prop_assert_eq!(a.quotas.iter().map(|q| q.count).sum::<usize>(), total);
            prop_assert_eq!(a.quotas.len(), spec.len());
        }
    }
}
