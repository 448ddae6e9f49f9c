use tracing::debug;

use crate::dataset::{CleanDataset, METHOD_COLUMN, RawTable};
use crate::error::PipelineError;
use crate::model::{Missingness, MissingnessEntry, OrderedMap};

pub fn clean(
    raw: &RawTable,
    allowed_methods: &[String],
    metrics: &[String],
    baseline_method: &str,
) -> Result<CleanDataset, PipelineError> {
    let mut dataset = CleanDataset::from_table(raw, metrics)?;
    let coerced = dataset.len();

    dataset.rows.retain(|row| {
        row.method
            .as_deref()
            .is_some_and(|method| allowed_methods.iter().any(|allowed| allowed == method))
    });

    let mut nulled = 0_usize;
    for row in &mut dataset.rows {
        for value in &mut row.values {
            if value.is_some_and(|v| v <= 0.0) {
                *value = None;
                nulled += 1;
            }
        }
    }

    if !dataset.contains_method(baseline_method) {
        return Err(PipelineError::validation(format!(
            "baseline method not present after cleaning: {baseline_method}"
        )));
    }

    debug!(
        rows_in = coerced,
        rows_kept = dataset.len(),
        nonpositive_nulled = nulled,
        column = METHOD_COLUMN,
        "cleaned dataset"
    );
    Ok(dataset)
}

pub fn missingness_entry(n_total: usize, n_nonnull: usize) -> MissingnessEntry {
    let missing_rate = if n_total == 0 {
        1.0
    } else {
        1.0 - n_nonnull as f64 / n_total as f64
    };
    MissingnessEntry {
        n_total,
        n_nonnull,
        missing_rate,
    }
}

pub fn compute_missingness(dataset: &CleanDataset, methods: &[String], metrics: &[String]) -> Missingness {
    let mut out = OrderedMap::new();
    for method in methods {
        let n_total = dataset.group_size(method);
        let mut by_metric = OrderedMap::new();
        for metric in metrics {
            let n_nonnull = dataset
                .metric_index(metric)
                .map_or(0, |index| dataset.sample(method, index).len());
            by_metric.insert(metric.as_str(), missingness_entry(n_total, n_nonnull));
        }
        out.insert(method.as_str(), by_metric);
    }
    out
}
