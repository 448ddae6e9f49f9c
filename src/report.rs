use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::model::{MetricsDocument, RunLogRecord};
use crate::stats::{BootstrapResult, CiReason};
use crate::util::write_text;

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(usize, String),
    Bullet(usize, Vec<Inline>),
    Table(Vec<String>, Vec<Vec<String>>),
    Code(String, Vec<String>),
    Rule,
}

fn text(value: impl Into<String>) -> Inline {
    Inline::Text(value.into())
}

fn strong(value: impl ToString) -> Inline {
    Inline::Strong(value.to_string())
}

fn code_or_dash(value: Option<&str>) -> Inline {
    match value {
        Some(value) if !value.is_empty() => Inline::Code(value.to_string()),
        _ => text("-"),
    }
}

fn bullet(inlines: Vec<Inline>) -> Block {
    Block::Bullet(0, inlines)
}

fn sub_bullet(inlines: Vec<Inline>) -> Block {
    Block::Bullet(1, inlines)
}

fn interval_cell(diff: Option<&BootstrapResult>) -> String {
    match diff {
        Some(BootstrapResult {
            ci_low: Some(low),
            ci_high: Some(high),
            ..
        }) => format!("[{}, {}]", format_number(Some(*low)), format_number(Some(*high))),
        Some(BootstrapResult {
            reason: Some(reason),
            ..
        }) => format!("N/A ({reason})"),
        _ => format!("N/A ({})", CiReason::InsufficientN),
    }
}

pub fn format_number(value: Option<f64>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "N/A".to_string();
    };
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{value:.3e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..4).contains(&exponent) {
        let decimals = (3 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}"))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    }
}

fn trim_fraction(rendered: &str) -> String {
    if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        rendered.to_string()
    }
}

fn count(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

pub fn build_report(run: &RunLogRecord, metrics: &MetricsDocument) -> Vec<Block> {
    let tap_used = run.tap.used;
    let outputs = &run.outputs;
    let figures_dir = outputs
        .get("figures_dir")
        .cloned()
        .unwrap_or_else(|| "artifacts/figures/".to_string());
    let warehouse = outputs
        .get("warehouse")
        .cloned()
        .unwrap_or_else(|| "warehouse/warehouse.sqlite".to_string());
    let clean_path = run
        .data_source
        .clean_snapshot_path
        .as_deref()
        .or(run.snapshots.clean_snapshot_path.as_deref());
    let metric_names: Vec<&str> = metrics.metrics.keys().collect();
    let bootstrap = &run.bootstrap;

    let mut blocks = vec![Block::Heading(1, "Exoplanet Method Comparison Report".to_string())];

    blocks.push(Block::Heading(2, "1. Takeaway".to_string()));
    blocks.extend(takeaway(metrics));

    blocks.push(Block::Heading(2, "2. Run metadata".to_string()));
    blocks.extend([
        bullet(vec![text("Generated (UTC): "), strong(&run.generated_utc)]),
        bullet(vec![text("Git commit: "), strong(&run.git_commit)]),
        bullet(vec![text("Status: "), strong(run.status.as_str())]),
        bullet(vec![text("Source table: "), Inline::Code(run.data_source.table.clone())]),
        bullet(vec![
            text("Rows: raw "),
            strong(count(run.row_counts.raw)),
            text(" / clean "),
            strong(count(run.row_counts.clean)),
        ]),
        bullet(vec![text("Baseline method: "), strong(&bootstrap.baseline_method)]),
        bullet(vec![
            text("Bootstrap: seed "),
            strong(bootstrap.seed),
            text(", resamples "),
            strong(bootstrap.n_resamples),
            text(", CI "),
            strong(bootstrap.ci),
        ]),
        sub_bullet(vec![text("Quantile method: "), strong(&bootstrap.quantile_method)]),
        sub_bullet(vec![
            text("CI eligibility threshold: "),
            strong(format!("n_nonnull >= {}", bootstrap.min_group_size_for_ci)),
        ]),
        bullet(vec![text("Schema hash: "), Inline::Code(run.schema_hash.clone())]),
    ]);

    blocks.push(Block::Heading(2, "3. Data source".to_string()));
    if tap_used {
        blocks.extend([
            bullet(vec![text(format!("{} (TAP)", run.data_source.name))]),
            sub_bullet(vec![text("Mode: "), code_or_dash(Some(run.data_source.mode.as_str()))]),
            sub_bullet(vec![text("Endpoint: "), code_or_dash(Some(run.data_source.endpoint.as_str()))]),
            sub_bullet(vec![text("Query: see Appendix A/B")]),
        ]);
    } else {
        blocks.extend([
            bullet(vec![text(format!("{} ({})", run.data_source.name, run.tap.reason))]),
            sub_bullet(vec![text("Input clean snapshot: "), code_or_dash(clean_path)]),
            sub_bullet(vec![
                text("Input sha256: "),
                code_or_dash(run.snapshots.clean_sha256.as_deref()),
            ]),
        ]);
    }
    blocks.extend([
        bullet(vec![text(
            "The composite planet table holds one row per planet, which suits method-wise summaries.",
        )]),
        bullet(vec![
            text("Caveat: composite values may come from different references and are "),
            strong("not necessarily self-consistent within a row"),
            text("."),
        ]),
    ]);

    blocks.push(Block::Heading(2, "4. Data contract".to_string()));
    blocks.extend([
        bullet(vec![
            text("Raw snapshot: "),
            code_or_dash(run.snapshots.raw_snapshot_path.as_deref()),
        ]),
        bullet(vec![text("Clean dataset: "), code_or_dash(clean_path)]),
        bullet(vec![
            text("Clean sha256: "),
            code_or_dash(run.snapshots.clean_sha256.as_deref()),
        ]),
        bullet(vec![text("Warehouse: "), Inline::Code(warehouse)]),
    ]);
    if !run.columns.used.is_empty() {
        blocks.push(bullet(vec![text("Columns used:")]));
        blocks.extend(
            run.columns
                .used
                .iter()
                .map(|column| sub_bullet(vec![Inline::Code(column.clone())])),
        );
    }

    blocks.push(Block::Heading(2, "5. Cleaning & validation".to_string()));
    blocks.extend([
        bullet(vec![
            text("Rows are "),
            strong("not dropped"),
            text(" solely because a metric is null."),
        ]),
        bullet(vec![
            text("Each metric keeps only values "),
            Inline::Code("> 0".to_string()),
            text("; non-positive values become null."),
        ]),
        bullet(vec![
            Inline::Code("disc_year".to_string()),
            text(" is descriptive only; invalid values become null."),
        ]),
    ]);

    blocks.push(Block::Heading(2, "6. Missingness (per metric x method)".to_string()));
    for metric in &metric_names {
        let rows = metrics
            .method_order
            .iter()
            .map(|method| {
                let entry = run.missingness.get(method).and_then(|by_metric| by_metric.get(metric));
                vec![
                    method.clone(),
                    count(entry.map(|e| e.n_total)),
                    count(entry.map(|e| e.n_nonnull)),
                    format_number(entry.map(|e| e.missing_rate)),
                ]
            })
            .collect();
        blocks.push(Block::Heading(3, metric.to_string()));
        blocks.push(Block::Table(
            headers(&["Method", "n_total", "n_nonnull", "missing_rate"]),
            rows,
        ));
    }
    blocks.push(bullet(vec![text(
        "Missingness may be non-random and can bias comparisons.",
    )]));

    blocks.push(Block::Heading(2, "7. Figures".to_string()));
    blocks.push(bullet(vec![text("Figures in "), Inline::Code(figures_dir.clone()), text(":")]));
    blocks.push(sub_bullet(vec![
        Inline::Code(format!("{figures_dir}method_counts.png")),
        text(": rows per method"),
    ]));
    blocks.push(sub_bullet(vec![
        Inline::Code(format!("{figures_dir}missingness_heatmap.png")),
        text(": missing rate, methods as rows and metrics as columns"),
    ]));
    for metric in &metric_names {
        let scale = if crate::plots::is_log_scaled(metric) { " (log10)" } else { "" };
        blocks.push(sub_bullet(vec![
            Inline::Code(format!("{figures_dir}{metric}_by_method.png")),
            text(format!(": p05/p25/p50/p75/p95 per method{scale}")),
        ]));
    }

    blocks.push(Block::Heading(2, "8. Statistical analysis".to_string()));
    blocks.extend([
        bullet(vec![text("Primary summaries: quantiles (p05/p25/p50/p75/p95) on non-null values.")]),
        bullet(vec![text("Diagnostics: mean/std/min/max on non-null values.")]),
        bullet(vec![text("Difference: median(metric | method) - median(metric | baseline).")]),
        bullet(vec![text(
            "The bootstrap percentile interval is computed only when both groups reach the CI threshold.",
        )]),
    ]);

    blocks.push(Block::Heading(2, "9. Results".to_string()));
    blocks.extend([
        bullet(vec![text("Footnotes:")]),
        sub_bullet(vec![text(
            "Mean and std are sensitive to heavy tails; comparisons rely on medians and quantiles.",
        )]),
        sub_bullet(vec![text(
            "For small n_nonnull the tail quantiles approach min/max; interpret cautiously.",
        )]),
    ]);
    for (metric, block) in metrics.metrics.iter() {
        let quantile_rows = metrics
            .method_order
            .iter()
            .filter_map(|method| {
                let summary = block.by_method.get(method)?;
                let s = &summary.stats;
                Some(vec![
                    method.clone(),
                    summary.counts.n_nonnull.to_string(),
                    format_number(s.p05),
                    format_number(s.p25),
                    format_number(s.p50),
                    format_number(s.p75),
                    format_number(s.p95),
                ])
            })
            .collect();
        let diagnostic_rows = metrics
            .method_order
            .iter()
            .filter_map(|method| {
                let s = &block.by_method.get(method)?.stats;
                Some(vec![
                    method.clone(),
                    format_number(s.mean),
                    format_number(s.std),
                    format_number(s.min),
                    format_number(s.max),
                ])
            })
            .collect();
        let diff_rows = metrics
            .method_order
            .iter()
            .filter(|method| **method != metrics.baseline_method)
            .map(|method| {
                let diff = block.diff_vs_baseline.get(method);
                vec![method.clone(), format_number(diff.and_then(|d| d.point)), interval_cell(diff)]
            })
            .collect();

        let units = if block.units.is_empty() {
            String::new()
        } else {
            format!(" [{}]", block.units)
        };
        blocks.extend([
            Block::Heading(3, format!("{metric}{units}: quantiles (primary)")),
            Block::Table(
                headers(&["Method", "n_nonnull", "p05", "p25", "p50", "p75", "p95"]),
                quantile_rows,
            ),
            Block::Heading(3, format!("{metric}: diagnostics")),
            Block::Table(headers(&["Method", "mean", "std", "min", "max"]), diagnostic_rows),
            Block::Heading(3, format!("{metric}: difference vs baseline")),
            Block::Table(headers(&["Method", "point (median diff)", "CI"]), diff_rows),
            Block::Rule,
        ]);
    }

    blocks.push(Block::Heading(2, "10. Interpretation".to_string()));
    blocks.push(bullet(vec![text(
        "Differences describe selection and detection effects; they support no causal claims.",
    )]));

    blocks.push(Block::Heading(2, "11. Limitations".to_string()));
    blocks.extend([
        bullet(vec![text("Composite table values are not necessarily self-consistent.")]),
        bullet(vec![text("Missingness can be non-random across methods.")]),
        bullet(vec![text(
            "Group imbalance widens uncertainty, especially for small methods and metrics.",
        )]),
    ]);

    blocks.push(Block::Heading(2, "12. How to reproduce".to_string()));
    let command = if tap_used {
        "exoplanet-report run --root .".to_string()
    } else {
        format!(
            "exoplanet-report offline --root . --clean {}",
            clean_path.unwrap_or("<PATH_TO_CLEAN_CSV>")
        )
    };
    blocks.push(Block::Code("bash".to_string(), vec![command]));
    blocks.push(bullet(vec![text("Recorded invocation: "), Inline::Code(run.command.clone())]));

    blocks.push(Block::Heading(2, "13. Appendix".to_string()));
    let offline = || vec!["N/A (offline run)".to_string()];
    blocks.push(Block::Heading(3, "A. Full ADQL".to_string()));
    blocks.push(Block::Code(
        "sql".to_string(),
        match (&run.data_source.adql, tap_used) {
            (Some(adql), true) => vec![adql.clone()],
            _ => offline(),
        },
    ));
    blocks.push(Block::Heading(3, "B. TAP sync URL (CSV)".to_string()));
    blocks.push(Block::Code(
        "text".to_string(),
        match (&run.data_source.url, tap_used) {
            (Some(url), true) => vec![url.clone()],
            _ => offline(),
        },
    ));

    blocks
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn takeaway(metrics: &MetricsDocument) -> Vec<Block> {
    let mut lines = Vec::new();
    for (metric, block) in metrics.metrics.iter() {
        let largest = block
            .diff_vs_baseline
            .iter()
            .filter_map(|(method, diff)| diff.point.map(|point| (method, point)))
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()));
        let line = match largest {
            Some((method, point)) => vec![
                Inline::Code(metric.to_string()),
                text(": largest median difference vs "),
                text(metrics.baseline_method.clone()),
                text(" is "),
                strong(method),
                text(format!(" ({})", format_number(Some(point)))),
            ],
            None => vec![
                Inline::Code(metric.to_string()),
                text(": no method has enough data for a comparison"),
            ],
        };
        lines.push(bullet(line));
    }
    lines
}

fn render_inline_md(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(value) => value.clone(),
            Inline::Strong(value) => format!("**{value}**"),
            Inline::Code(value) => format!("`{value}`"),
        })
        .collect()
}

pub fn render_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut previous_was_bullet = false;
    for block in blocks {
        let is_bullet = matches!(block, Block::Bullet(..));
        if !out.is_empty() && !(is_bullet && previous_was_bullet) {
            out.push('\n');
        }
        match block {
            Block::Heading(level, title) => {
                out.push_str(&format!("{} {title}\n", "#".repeat(*level)));
            }
            Block::Bullet(depth, inlines) => {
                out.push_str(&format!("{}- {}\n", "  ".repeat(*depth), render_inline_md(inlines)));
            }
            Block::Table(header, rows) => {
                out.push_str(&format!("| {} |\n", header.join(" | ")));
                out.push_str(&format!("| {} |\n", vec!["---"; header.len()].join(" | ")));
                for row in rows {
                    out.push_str(&format!("| {} |\n", row.join(" | ")));
                }
            }
            Block::Code(lang, lines) => {
                out.push_str(&format!("```{lang}\n"));
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str("```\n");
            }
            Block::Rule => out.push_str("---\n"),
        }
        previous_was_bullet = is_bullet;
    }
    out
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_inline_html(inlines: &[Inline]) -> String {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(value) => escape_html(value),
            Inline::Strong(value) => format!("<strong>{}</strong>", escape_html(value)),
            Inline::Code(value) => format!("<code>{}</code>", escape_html(value)),
        })
        .collect()
}

fn render_list_html(items: &[(usize, &[Inline])], out: &mut String) {
    out.push_str("<ul>\n");
    let mut index = 0;
    while index < items.len() {
        let (depth, inlines) = items[index];
        let children_end = items[index + 1..]
            .iter()
            .position(|(child_depth, _)| *child_depth <= depth)
            .map_or(items.len(), |offset| index + 1 + offset);

        out.push_str("<li>");
        out.push_str(&render_inline_html(inlines));
        if children_end > index + 1 {
            out.push('\n');
            render_list_html(&items[index + 1..children_end], out);
        }
        out.push_str("</li>\n");
        index = children_end;
    }
    out.push_str("</ul>\n");
}

pub fn render_html(blocks: &[Block]) -> String {
    let mut body = String::new();
    let mut index = 0;
    while index < blocks.len() {
        match &blocks[index] {
            Block::Bullet(..) => {
                let mut items = Vec::new();
                while let Some(Block::Bullet(depth, inlines)) = blocks.get(index) {
                    items.push((*depth, inlines.as_slice()));
                    index += 1;
                }
                render_list_html(&items, &mut body);
                continue;
            }
            Block::Heading(level, title) => {
                body.push_str(&format!("<h{level}>{}</h{level}>\n", escape_html(title)));
            }
            Block::Table(header, rows) => {
                body.push_str("<table>\n<thead>\n<tr>");
                for cell in header {
                    body.push_str(&format!("<th>{}</th>", escape_html(cell)));
                }
                body.push_str("</tr>\n</thead>\n<tbody>\n");
                for row in rows {
                    body.push_str("<tr>");
                    for cell in row {
                        body.push_str(&format!("<td>{}</td>", escape_html(cell)));
                    }
                    body.push_str("</tr>\n");
                }
                body.push_str("</tbody>\n</table>\n");
            }
            Block::Code(lang, lines) => {
                body.push_str(&format!("<pre><code class=\"language-{}\">", escape_html(lang)));
                for line in lines {
                    body.push_str(&escape_html(line));
                    body.push('\n');
                }
                body.push_str("</code></pre>\n");
            }
            Block::Rule => body.push_str("<hr />\n"),
        }
        index += 1;
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n\
         <title>Exoplanet Method Comparison Report</title>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_report_files(
    run_json_path: &Path,
    metrics_json_path: &Path,
    report_md_path: &Path,
    report_html_path: &Path,
) -> Result<()> {
    let run: RunLogRecord = read_json(run_json_path)?;
    let metrics: MetricsDocument = read_json(metrics_json_path)?;

    let blocks = build_report(&run, &metrics);
    write_text(report_md_path, &render_markdown(&blocks))?;
    write_text(report_html_path, &render_html(&blocks))?;

    info!(
        markdown = %report_md_path.display(),
        html = %report_html_path.display(),
        "wrote report"
    );
    Ok(())
}
