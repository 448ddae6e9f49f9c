use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMethod {
    InvertedCdf,
    AveragedInvertedCdf,
    ClosestObservation,
    InterpolatedInvertedCdf,
    Hazen,
    Weibull,
    Linear,
    MedianUnbiased,
    NormalUnbiased,
    Lower,
    Higher,
    Midpoint,
    Nearest,
}

impl QuantileMethod {
    pub const ALL: [QuantileMethod; 13] = [
        Self::InvertedCdf,
        Self::AveragedInvertedCdf,
        Self::ClosestObservation,
        Self::InterpolatedInvertedCdf,
        Self::Hazen,
        Self::Weibull,
        Self::Linear,
        Self::MedianUnbiased,
        Self::NormalUnbiased,
        Self::Lower,
        Self::Higher,
        Self::Midpoint,
        Self::Nearest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvertedCdf => "inverted_cdf",
            Self::AveragedInvertedCdf => "averaged_inverted_cdf",
            Self::ClosestObservation => "closest_observation",
            Self::InterpolatedInvertedCdf => "interpolated_inverted_cdf",
            Self::Hazen => "hazen",
            Self::Weibull => "weibull",
            Self::Linear => "linear",
            Self::MedianUnbiased => "median_unbiased",
            Self::NormalUnbiased => "normal_unbiased",
            Self::Lower => "lower",
            Self::Higher => "higher",
            Self::Midpoint => "midpoint",
            Self::Nearest => "nearest",
        }
    }

    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        Self::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == name)
            .ok_or_else(|| {
                let mut allowed: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                allowed.sort_unstable();
                PipelineError::validation(format!(
                    "invalid quantile_method={name:?}; allowed: {}",
                    allowed.join(", ")
                ))
            })
    }

    fn plotting_position(self) -> Option<(f64, f64)> {
        match self {
            Self::InterpolatedInvertedCdf => Some((0.0, 1.0)),
            Self::Hazen => Some((0.5, 0.5)),
            Self::Weibull => Some((0.0, 0.0)),
            Self::Linear => Some((1.0, 1.0)),
            Self::MedianUnbiased => Some((1.0 / 3.0, 1.0 / 3.0)),
            Self::NormalUnbiased => Some((3.0 / 8.0, 3.0 / 8.0)),
            _ => None,
        }
    }
}

impl fmt::Display for QuantileMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantileMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn quantile_sorted(sorted: &[f64], q: f64, method: QuantileMethod) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let n = sorted.len() as f64;
    let value = match method {
        QuantileMethod::Lower => sorted[clamp_index(((n - 1.0) * q).floor(), sorted.len())],
        QuantileMethod::Higher => sorted[clamp_index(((n - 1.0) * q).ceil(), sorted.len())],
        QuantileMethod::Nearest => {
            sorted[clamp_index(((n - 1.0) * q).round_ties_even(), sorted.len())]
        }
        QuantileMethod::InvertedCdf => {
            discrete(sorted, n * q - 1.0, |gamma, _| gamma == 0.0)
        }
        QuantileMethod::ClosestObservation => discrete(sorted, n * q - 1.5, |gamma, index| {
            gamma == 0.0 && index.floor().rem_euclid(2.0) == 1.0
        }),
        QuantileMethod::AveragedInvertedCdf => {
            continuous(sorted, n * q - 1.0, |gamma| if gamma == 0.0 { 0.5 } else { 1.0 })
        }
        QuantileMethod::Midpoint => {
            let index = (n - 1.0) * q;
            let gamma = if index.fract() == 0.0 { 0.0 } else { 0.5 };
            continuous(sorted, index, |_| gamma)
        }
        QuantileMethod::InterpolatedInvertedCdf
        | QuantileMethod::Hazen
        | QuantileMethod::Weibull
        | QuantileMethod::Linear
        | QuantileMethod::MedianUnbiased
        | QuantileMethod::NormalUnbiased => {
            let (alpha, beta) = method.plotting_position().unwrap_or((1.0, 1.0));
            let index = n * q + (alpha + q * (1.0 - alpha - beta)) - 1.0;
            continuous(sorted, index, |gamma| gamma)
        }
    };

    Some(value)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut scratch = values.to_vec();
    Some(median_in_place(&mut scratch))
}

// Reorders `values`. Callers guarantee a non-empty slice.
pub(super) fn median_in_place(values: &mut [f64]) -> f64 {
    let len = values.len();
    let (lower, upper, _) = values.select_nth_unstable_by(len / 2, f64::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return upper;
    }
    let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lower_max + upper) / 2.0
}

fn clamp_index(index: f64, len: usize) -> usize {
    if index <= 0.0 {
        0
    } else {
        (index as usize).min(len - 1)
    }
}

fn discrete(sorted: &[f64], index: f64, take_previous: impl Fn(f64, f64) -> bool) -> f64 {
    let previous = index.floor();
    let gamma = index - previous;
    let chosen = if take_previous(gamma, index) {
        previous
    } else {
        previous + 1.0
    };
    sorted[clamp_index(chosen, sorted.len())]
}

fn continuous(sorted: &[f64], index: f64, fix_gamma: impl Fn(f64) -> f64) -> f64 {
    let last = sorted.len() - 1;
    if index < 0.0 {
        return sorted[0];
    }
    if index >= last as f64 {
        return sorted[last];
    }

    let previous = index.floor();
    let lower = previous as usize;
    let gamma = fix_gamma(index - previous);
    lerp(sorted[lower], sorted[lower + 1], gamma)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 { b - diff * (1.0 - t) } else { a + diff * t }
}
