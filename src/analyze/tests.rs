use super::*;
use crate::clean::{clean, compute_missingness};
use crate::dataset::RawTable;
use crate::stats::CiReason;

const STAMP: &str = "2026-01-02T03:04:05Z";

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn row(name: &str, method: &str, provenance: &str, rade: &str, orbper: &str) -> Vec<Option<String>> {
    [name, method, provenance, rade, orbper]
        .iter()
        .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
        .collect()
}

// 25 Transit rows, 3 Imaging rows, no Radial Velocity rows.
fn dataset() -> CleanDataset {
    let mut rows = Vec::new();
    for i in 1..=25 {
        let provenance = if i % 2 == 0 { "Mass" } else { "Msini" };
        rows.push(row(&format!("t{i}"), "Transit", provenance, &i.to_string(), &(i * 2).to_string()));
    }
    rows.push(row("i1", "Imaging", "Mass (Msini)", "10", ""));
    rows.push(row("i2", "Imaging", "", "12", ""));
    rows.push(row("i3", "Imaging", "Planetary mass", "", "400"));

    let raw = RawTable {
        columns: strings(&["pl_name", "discoverymethod", "pl_bmassprov", "pl_rade", "pl_orbper"]),
        rows,
    };
    clean(
        &raw,
        &strings(&["Transit", "Radial Velocity", "Imaging"]),
        &strings(&["pl_rade", "pl_orbper"]),
        "Transit",
    )
    .expect("fixture cleans")
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        metrics: strings(&["pl_rade", "pl_orbper"]),
        method_order: strings(&["Transit", "Radial Velocity", "Imaging"]),
        baseline_method: "Transit".to_string(),
        seed: 42,
        n_resamples: 200,
        ci: 0.95,
        quantile_method: "linear".to_string(),
        std_ddof: 1,
        min_group_size_for_ci: 2,
    }
}

#[test]
fn provenance_classification_prefers_msini_and_skips_nulls() {
    let values = [Some("Mass"), Some("Msini"), Some("Mass (Msini)"), None, Some("Other text")];
    let classified: Vec<_> = values.iter().map(|value| value.map(MassProvenance::classify)).collect();
    assert_eq!(
        classified,
        vec![
            Some(MassProvenance::Mass),
            Some(MassProvenance::Msini),
            Some(MassProvenance::Msini),
            None,
            Some(MassProvenance::Other),
        ]
    );

    let counts = mass_provenance_counts(values);
    assert_eq!(
        counts,
        MassProvenanceCounts {
            msini: 2,
            mass: 1,
            other: 1,
        }
    );
}

#[test]
fn document_follows_method_order_and_omits_baseline_diff() {
    let doc = compute_metrics_at(&dataset(), &request(), STAMP.to_string()).expect("metrics");

    assert_eq!(doc.generated_utc, STAMP);
    assert_eq!(doc.analysis.quantile_method, QuantileMethod::Linear);
    assert_eq!(
        doc.mass_provenance.by_method.keys().collect::<Vec<_>>(),
        vec!["Transit", "Radial Velocity", "Imaging"]
    );
    assert_eq!(
        doc.mass_provenance.by_method.get("Imaging"),
        Some(&MassProvenanceCounts {
            msini: 1,
            mass: 0,
            other: 1,
        })
    );

    let rade = doc.metrics.get("pl_rade").expect("pl_rade block");
    assert_eq!(rade.units, "Earth radii");
    assert_eq!(
        rade.by_method.keys().collect::<Vec<_>>(),
        vec!["Transit", "Radial Velocity", "Imaging"]
    );
    assert_eq!(
        rade.diff_vs_baseline.keys().collect::<Vec<_>>(),
        vec!["Radial Velocity", "Imaging"]
    );
    assert!(rade.diff_vs_baseline.get("Transit").is_none());
}

#[test]
fn empty_group_propagates_nulls_instead_of_failing() {
    let doc = compute_metrics_at(&dataset(), &request(), STAMP.to_string()).expect("metrics");
    let rade = doc.metrics.get("pl_rade").expect("pl_rade block");

    let rv = rade.by_method.get("Radial Velocity").expect("rv summary");
    assert_eq!(rv.counts.n_total, 0);
    assert_eq!(rv.counts.missing_rate, 1.0);
    assert_eq!(rv.stats.p50, None);

    let diff = rade.diff_vs_baseline.get("Radial Velocity").expect("rv diff");
    assert_eq!(diff.point, None);
    assert_eq!(diff.reason, Some(CiReason::InsufficientN));
}

#[test]
fn imaging_diff_uses_non_null_samples() {
    let doc = compute_metrics_at(&dataset(), &request(), STAMP.to_string()).expect("metrics");
    let rade = doc.metrics.get("pl_rade").expect("pl_rade block");

    let imaging = rade.by_method.get("Imaging").expect("imaging summary");
    assert_eq!(imaging.counts.n_total, 3);
    assert_eq!(imaging.counts.n_nonnull, 2);
    assert_eq!(imaging.stats.p50, Some(11.0));

    let diff = rade.diff_vs_baseline.get("Imaging").expect("imaging diff");
    assert_eq!(diff.point, Some(11.0 - 13.0));
    assert_eq!(diff.reason, None);
    assert!(diff.ci_low.is_some() && diff.ci_high.is_some());

    let orbper = doc.metrics.get("pl_orbper").expect("pl_orbper block");
    let diff = orbper.diff_vs_baseline.get("Imaging").expect("imaging diff");
    assert_eq!(diff.point, Some(400.0 - 26.0));
    assert_eq!(diff.ci_low, None);
    assert_eq!(diff.reason, Some(CiReason::InsufficientN));
}

#[test]
fn per_method_counts_agree_with_missingness() {
    let data = dataset();
    let req = request();
    let doc = compute_metrics_at(&data, &req, STAMP.to_string()).expect("metrics");
    let missingness = compute_missingness(&data, &req.method_order, &req.metrics);

    for metric in &req.metrics {
        let block = doc.metrics.get(metric).expect("metric block");
        for method in &req.method_order {
            let summary = block.by_method.get(method).expect("summary");
            let entry = missingness
                .get(method)
                .and_then(|by_metric| by_metric.get(metric))
                .expect("missingness entry");
            assert_eq!(summary.counts, *entry, "{method}/{metric}");
        }
    }
}

#[test]
fn invalid_quantile_method_fails_before_computation() {
    let mut req = request();
    req.quantile_method = "cubic".to_string();
    let err = compute_metrics_at(&dataset(), &req, STAMP.to_string()).expect_err("invalid method");
    let PipelineError::Validation(message) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(message.contains("cubic"));
    assert!(message.contains("averaged_inverted_cdf, closest_observation"));
}

#[test]
fn out_of_range_ci_is_rejected() {
    let mut req = request();
    req.ci = 1.0;
    let err = compute_metrics_at(&dataset(), &req, STAMP.to_string()).expect_err("bad ci");
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn unknown_metric_is_a_schema_error() {
    let mut req = request();
    req.metrics.push("pl_bmasse".to_string());
    let err = compute_metrics_at(&dataset(), &req, STAMP.to_string()).expect_err("unknown metric");
    assert_eq!(
        err,
        PipelineError::Schema {
            missing: vec!["pl_bmasse".to_string()],
        }
    );
}

#[test]
fn repeated_computation_is_identical() {
    let data = dataset();
    let first = compute_metrics_at(&data, &request(), STAMP.to_string()).expect("metrics");
    let second = compute_metrics_at(&data, &request(), STAMP.to_string()).expect("metrics");
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn document_round_trips_through_json() {
    let doc = compute_metrics_at(&dataset(), &request(), STAMP.to_string()).expect("metrics");
    let json = serde_json::to_string_pretty(&doc).expect("serialize");
    assert!(!json.contains("NaN"));
    assert!(json.contains(r#""reason": "insufficient_n""#));

    let parsed: MetricsDocument = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, doc);

    let value: serde_json::Value = serde_json::from_str(&json).expect("value");
    assert_eq!(value["analysis"]["quantile_method"], "linear");
    assert_eq!(value["metrics"]["pl_rade"]["by_method"]["Radial Velocity"]["missing_rate"], 1.0);
    assert!(value["metrics"]["pl_rade"]["by_method"]["Radial Velocity"]["std"].is_null());
}
