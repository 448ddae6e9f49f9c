use anyhow::Result;
use tracing::info;

use super::pipeline::{PipelineContext, analyze_and_publish, execute, render_command};
use crate::clean::clean;
use crate::cli::RunArgs;
use crate::runlog::RunLog;
use crate::snapshot::{compact_stamp, parse_csv_bytes, write_clean_dataset, write_raw_snapshot};
use crate::tap::{RetryPolicy, fetch_tap_csv};

pub fn run(args: RunArgs) -> Result<()> {
    let ctx = PipelineContext::load(&args.root, args.config.as_deref())?;
    ctx.paths.ensure_dirs()?;

    let command = render_command("run", &args.root, args.config.as_deref(), &[]);
    let run_log = ctx.start_run_log(command)?;
    info!(
        root = %ctx.paths.root.display(),
        table = %ctx.config.tap.table,
        generated_utc = %run_log.generated_utc(),
        "starting live run"
    );

    execute(&ctx, run_log, |run_log| live_stages(&ctx, run_log))
}

fn live_stages(ctx: &PipelineContext, run_log: &mut RunLog) -> Result<()> {
    let config = &ctx.config;
    let paths = &ctx.paths;
    run_log.set_data_source(ctx.data_source("NASA Exoplanet Archive", "tap"));

    let fetch = fetch_tap_csv(
        &config.tap,
        &config.columns.used,
        &config.filters.discoverymethod_in,
        &RetryPolicy::default(),
    )?;
    let mut data_source = ctx.data_source("NASA Exoplanet Archive", "tap");
    data_source.adql = Some(fetch.adql.clone());
    data_source.url = Some(fetch.url.clone());
    run_log.set_data_source(data_source);
    run_log.set_http(fetch.http.clone());
    run_log.set_tap_usage(true, "live fetch");

    let stamp = compact_stamp(run_log.generated_utc());
    let raw = parse_csv_bytes(&fetch.csv_bytes)?;
    let raw_snapshot = write_raw_snapshot(&raw, &paths.data_raw_dir, &config.tap.table, &stamp)?;
    run_log.record_raw_snapshot(
        paths.relative(&raw_snapshot.path),
        raw_snapshot.sha256,
        raw_snapshot.rows,
    );

    let dataset = clean(
        &raw,
        &config.filters.discoverymethod_in,
        &config.metrics,
        &config.analysis.baseline_method,
    )?;
    let clean_snapshot = write_clean_dataset(&dataset, &paths.data_clean_dir, &config.tap.table, &stamp)?;
    run_log.record_clean_snapshot(
        paths.relative(&clean_snapshot.path),
        clean_snapshot.sha256,
        clean_snapshot.rows,
    );

    analyze_and_publish(ctx, &dataset, run_log)
}
