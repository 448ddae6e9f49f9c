use tracing::info;

use crate::clean::missingness_entry;
use crate::config::Config;
use crate::dataset::CleanDataset;
use crate::error::PipelineError;
use crate::model::{
    AnalysisSettings, MassProvenanceCounts, MassProvenanceSection, MethodSummary, MetricBlock,
    MetricsDocument, OrderedMap,
};
use crate::stats::{BootstrapSettings, QuantileMethod, bootstrap_median_diff, summary_stats};
use crate::util::now_utc_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassProvenance {
    Msini,
    Mass,
    Other,
}

impl MassProvenance {
    // Msini wins over Mass, so "Mass (Msini)" lands in Msini.
    pub fn classify(value: &str) -> Self {
        if value.contains("Msini") {
            Self::Msini
        } else if value.contains("Mass") {
            Self::Mass
        } else {
            Self::Other
        }
    }
}

pub fn mass_provenance_counts<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> MassProvenanceCounts {
    let mut counts = MassProvenanceCounts::default();
    for value in values.into_iter().flatten() {
        match MassProvenance::classify(value) {
            MassProvenance::Msini => counts.msini += 1,
            MassProvenance::Mass => counts.mass += 1,
            MassProvenance::Other => counts.other += 1,
        }
    }
    counts
}

pub fn metric_units(metric: &str) -> &'static str {
    match metric {
        "pl_rade" => "Earth radii",
        "pl_orbper" => "days",
        "pl_bmasse" => "Earth masses",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub metrics: Vec<String>,
    pub method_order: Vec<String>,
    pub baseline_method: String,
    pub seed: u64,
    pub n_resamples: usize,
    pub ci: f64,
    pub quantile_method: String,
    pub std_ddof: usize,
    pub min_group_size_for_ci: usize,
}

impl AnalysisRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            metrics: config.metrics.clone(),
            method_order: config.method_order.clone(),
            baseline_method: config.analysis.baseline_method.clone(),
            seed: config.bootstrap.seed,
            n_resamples: config.bootstrap.n_resamples,
            ci: config.bootstrap.ci,
            quantile_method: config.bootstrap.quantile_method.clone(),
            std_ddof: config.analysis.std_ddof,
            min_group_size_for_ci: config.thresholds.min_group_size_for_ci,
        }
    }

    fn validate(&self) -> Result<BootstrapSettings, PipelineError> {
        let quantile_method = QuantileMethod::parse(&self.quantile_method)?;
        if !(self.ci > 0.0 && self.ci < 1.0) {
            return Err(PipelineError::validation(format!(
                "bootstrap ci must lie strictly between 0 and 1, got {}",
                self.ci
            )));
        }
        if self.n_resamples == 0 {
            return Err(PipelineError::validation("bootstrap n_resamples must be at least 1"));
        }
        Ok(BootstrapSettings {
            seed: self.seed,
            n_resamples: self.n_resamples,
            ci: self.ci,
            quantile_method,
            min_group_size_for_ci: self.min_group_size_for_ci,
        })
    }
}

pub fn compute_metrics(
    dataset: &CleanDataset,
    request: &AnalysisRequest,
) -> Result<MetricsDocument, PipelineError> {
    compute_metrics_at(dataset, request, now_utc_string())
}

fn compute_metrics_at(
    dataset: &CleanDataset,
    request: &AnalysisRequest,
    generated_utc: String,
) -> Result<MetricsDocument, PipelineError> {
    let settings = request.validate()?;

    let missing: Vec<String> = request
        .metrics
        .iter()
        .filter(|metric| dataset.metric_index(metric).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema { missing });
    }

    let mut provenance = OrderedMap::new();
    for method in &request.method_order {
        let counts = mass_provenance_counts(dataset.group(method).map(|row| row.mass_provenance.as_deref()));
        provenance.insert(method.as_str(), counts);
    }

    let mut metrics = OrderedMap::new();
    for metric in &request.metrics {
        let index = dataset
            .metric_index(metric)
            .ok_or_else(|| PipelineError::Schema {
                missing: vec![metric.clone()],
            })?;
        let baseline_sample = dataset.sample(&request.baseline_method, index);

        let mut by_method = OrderedMap::new();
        let mut diff_vs_baseline = OrderedMap::new();
        for method in &request.method_order {
            let sample = dataset.sample(method, index);
            let counts = missingness_entry(dataset.group_size(method), sample.len());
            let stats = summary_stats(&sample, settings.quantile_method, request.std_ddof);
            by_method.insert(method.as_str(), MethodSummary { counts, stats });

            if *method == request.baseline_method {
                continue;
            }
            let diff = bootstrap_median_diff(&sample, &baseline_sample, &settings);
            diff_vs_baseline.insert(method.as_str(), diff);
        }

        metrics.insert(
            metric.as_str(),
            MetricBlock {
                units: metric_units(metric).to_string(),
                by_method,
                diff_vs_baseline,
            },
        );
    }

    info!(
        metrics = request.metrics.len(),
        methods = request.method_order.len(),
        n_resamples = settings.n_resamples,
        quantile_method = %settings.quantile_method,
        "computed metrics"
    );

    Ok(MetricsDocument {
        generated_utc,
        baseline_method: request.baseline_method.clone(),
        method_order: request.method_order.clone(),
        analysis: AnalysisSettings {
            std_ddof: request.std_ddof,
            quantile_method: settings.quantile_method,
        },
        mass_provenance: MassProvenanceSection { by_method: provenance },
        metrics,
    })
}

#[cfg(test)]
mod tests;
