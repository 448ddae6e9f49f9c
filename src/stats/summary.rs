use serde::{Deserialize, Serialize};

use super::quantile::{QuantileMethod, quantile_sorted};

pub const QUANTILE_POINTS: [f64; 5] = [0.05, 0.25, 0.50, 0.75, 0.95];

/// Every field is `None` exactly when the sample is empty, except `std`,
/// which is also `None` when the sample has no more than `ddof` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub min: Option<f64>,
    pub p05: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p95: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

pub fn summary_stats(sample: &[f64], quantile_method: QuantileMethod, std_ddof: usize) -> SummaryStats {
    if sample.is_empty() {
        return SummaryStats::default();
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    let [p05, p25, p50, p75, p95] =
        QUANTILE_POINTS.map(|q| quantile_sorted(&sorted, q, quantile_method));

    SummaryStats {
        min: sorted.first().copied(),
        p05,
        p25,
        p50,
        p75,
        p95,
        max: sorted.last().copied(),
        mean: Some(mean(sample)),
        std: std_dev(sample, std_ddof),
    }
}

fn mean(sample: &[f64]) -> f64 {
    sample.iter().sum::<f64>() / sample.len() as f64
}

fn std_dev(sample: &[f64], ddof: usize) -> Option<f64> {
    let n = sample.len();
    if n == 0 || n <= ddof {
        return None;
    }
    let center = mean(sample);
    let squares = sample.iter().map(|x| (x - center).powi(2)).sum::<f64>();
    Some((squares / (n - ddof) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_yields_all_null_fields() {
        let stats = summary_stats(&[], QuantileMethod::Linear, 1);
        assert_eq!(stats, SummaryStats::default());
        let json = serde_json::to_value(stats).expect("serialize");
        for key in ["min", "p05", "p25", "p50", "p75", "p95", "max", "mean", "std"] {
            assert!(json[key].is_null(), "{key} should be null");
        }
    }

    #[test]
    fn summary_of_small_sample_matches_hand_computation() {
        let stats = summary_stats(&[4.0, 1.0, 3.0, 2.0, 5.0], QuantileMethod::Linear, 1);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.p50, Some(3.0));
        assert_eq!(stats.p25, Some(2.0));
        assert_eq!(stats.mean, Some(3.0));
        let std = stats.std.expect("std defined for n > ddof");
        assert!((std - 2.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn std_is_null_when_sample_size_does_not_exceed_ddof() {
        let stats = summary_stats(&[7.0], QuantileMethod::Linear, 1);
        assert_eq!(stats.min, Some(7.0));
        assert_eq!(stats.mean, Some(7.0));
        assert_eq!(stats.std, None);

        let stats = summary_stats(&[1.0, 2.0], QuantileMethod::Linear, 2);
        assert_eq!(stats.std, None);
    }

    #[test]
    fn population_std_uses_full_denominator() {
        let stats = summary_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], QuantileMethod::Linear, 0);
        assert_eq!(stats.std, Some(2.0));
    }

    #[test]
    fn quantiles_are_ordered_for_every_method() {
        let sample = [0.3, 12.0, 1.1, 5.5, 2.2, 8.8, 0.9];
        for method in QuantileMethod::ALL {
            let stats = summary_stats(&sample, method, 1);
            let ordered = [
                stats.min, stats.p05, stats.p25, stats.p50, stats.p75, stats.p95, stats.max,
            ]
            .map(|value| value.expect("non-empty sample"));
            assert!(ordered.windows(2).all(|pair| pair[0] <= pair[1]), "{method}: {ordered:?}");
        }
    }
}
