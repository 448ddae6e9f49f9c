use std::fmt;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use super::quantile::{QuantileMethod, median, median_in_place, quantile_sorted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiReason {
    InsufficientN,
}

impl fmt::Display for CiReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientN => f.write_str("insufficient n"),
        }
    }
}

/// `point` is `None` iff a group was empty; `ci_low`/`ci_high` are set together
/// and `reason` is set exactly when they are not. Bounds are not reordered
/// relative to `point`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub point: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
    pub reason: Option<CiReason>,
}

impl BootstrapResult {
    fn insufficient(point: Option<f64>) -> Self {
        Self {
            point,
            ci_low: None,
            ci_high: None,
            reason: Some(CiReason::InsufficientN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSettings {
    pub seed: u64,
    pub n_resamples: usize,
    pub ci: f64,
    pub quantile_method: QuantileMethod,
    pub min_group_size_for_ci: usize,
}

pub fn bootstrap_median_diff(
    group_a: &[f64],
    group_b: &[f64],
    settings: &BootstrapSettings,
) -> BootstrapResult {
    let (Some(median_a), Some(median_b)) = (median(group_a), median(group_b)) else {
        return BootstrapResult::insufficient(None);
    };
    let point = median_a - median_b;

    if group_a.len() < settings.min_group_size_for_ci
        || group_b.len() < settings.min_group_size_for_ci
        || settings.n_resamples == 0
    {
        return BootstrapResult::insufficient(Some(point));
    }

    let mut diffs = resample_median_diffs(group_a, group_b, settings.seed, settings.n_resamples);
    diffs.sort_by(f64::total_cmp);

    let tail = (1.0 - settings.ci) / 2.0;
    let ci_low = quantile_sorted(&diffs, tail, settings.quantile_method);
    let ci_high = quantile_sorted(&diffs, 1.0 - tail, settings.quantile_method);

    BootstrapResult {
        point: Some(point),
        ci_low,
        ci_high,
        reason: None,
    }
}

// Each resample draws len(a) indices into a, then len(b) indices into b.
fn resample_median_diffs(group_a: &[f64], group_b: &[f64], seed: u64, n_resamples: usize) -> Vec<f64> {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut scratch_a = vec![0.0; group_a.len()];
    let mut scratch_b = vec![0.0; group_b.len()];

    (0..n_resamples)
        .map(|_| {
            draw_with_replacement(&mut rng, group_a, &mut scratch_a);
            draw_with_replacement(&mut rng, group_b, &mut scratch_b);
            median_in_place(&mut scratch_a) - median_in_place(&mut scratch_b)
        })
        .collect()
}

fn draw_with_replacement(rng: &mut XorShiftRng, source: &[f64], out: &mut [f64]) {
    // u64 keeps the draw sequence independent of the platform's usize width.
    let len = source.len() as u64;
    for slot in out.iter_mut() {
        *slot = source[rng.gen_range(0..len) as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(min_group_size_for_ci: usize) -> BootstrapSettings {
        BootstrapSettings {
            seed: 42,
            n_resamples: 1000,
            ci: 0.95,
            quantile_method: QuantileMethod::Linear,
            min_group_size_for_ci,
        }
    }

    fn range(start: u32, len: u32) -> Vec<f64> {
        (start..start + len).map(f64::from).collect()
    }

    #[test]
    fn empty_group_yields_no_point_and_no_interval() {
        let result = bootstrap_median_diff(&[], &[1.0, 2.0, 3.0], &settings(20));
        assert_eq!(
            result,
            BootstrapResult {
                point: None,
                ci_low: None,
                ci_high: None,
                reason: Some(CiReason::InsufficientN),
            }
        );

        let result = bootstrap_median_diff(&[1.0], &[], &settings(0));
        assert_eq!(result.point, None);
        assert_eq!(result.reason, Some(CiReason::InsufficientN));
    }

    #[test]
    fn small_group_keeps_point_but_skips_interval() {
        let group_a = range(1, 5);
        let group_b = range(1, 50);
        let result = bootstrap_median_diff(&group_a, &group_b, &settings(20));

        assert_eq!(result.point, Some(3.0 - 25.5));
        assert_eq!(result.ci_low, None);
        assert_eq!(result.ci_high, None);
        assert_eq!(result.reason, Some(CiReason::InsufficientN));
    }

    #[test]
    fn full_computation_produces_ordered_interval() {
        let group_a = range(1, 30);
        let group_b = range(10, 30);
        let result = bootstrap_median_diff(&group_a, &group_b, &settings(20));

        assert_eq!(result.point, Some(15.5 - 24.5));
        assert_eq!(result.reason, None);
        let low = result.ci_low.expect("interval computed");
        let high = result.ci_high.expect("interval computed");
        assert!(low <= high);
    }

    #[test]
    fn identical_inputs_reproduce_bit_identical_results() {
        let group_a = range(1, 30);
        let group_b = range(10, 30);
        let first = bootstrap_median_diff(&group_a, &group_b, &settings(20));
        let second = bootstrap_median_diff(&group_a, &group_b, &settings(20));

        assert_eq!(first.point.map(f64::to_bits), second.point.map(f64::to_bits));
        assert_eq!(first.ci_low.map(f64::to_bits), second.ci_low.map(f64::to_bits));
        assert_eq!(first.ci_high.map(f64::to_bits), second.ci_high.map(f64::to_bits));
    }

    #[test]
    fn different_seeds_draw_different_resamples() {
        let group_a = range(1, 30);
        let group_b = range(10, 30);
        let first = resample_median_diffs(&group_a, &group_b, 1, 200);
        let second = resample_median_diffs(&group_a, &group_b, 2, 200);
        assert_eq!(first.len(), 200);
        assert_ne!(first, second);
    }

    #[test]
    fn constant_groups_collapse_interval_onto_point() {
        let group_a = vec![2.0; 25];
        let group_b = vec![0.5; 25];
        let result = bootstrap_median_diff(&group_a, &group_b, &settings(20));
        assert_eq!(result.point, Some(1.5));
        assert_eq!(result.ci_low, Some(1.5));
        assert_eq!(result.ci_high, Some(1.5));
    }

    #[test]
    fn result_serializes_reason_as_snake_case() {
        let result = BootstrapResult::insufficient(Some(1.0));
        let json = serde_json::to_string(&result).expect("serialize");
        assert_eq!(
            json,
            r#"{"point":1.0,"ci_low":null,"ci_high":null,"reason":"insufficient_n"}"#
        );
    }
}
