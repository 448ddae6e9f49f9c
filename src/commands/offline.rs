use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::pipeline::{PipelineContext, analyze_and_publish, execute, render_command};
use crate::cli::OfflineArgs;
use crate::error::PipelineError;
use crate::model::HttpMeta;
use crate::runlog::RunLog;
use crate::snapshot::read_clean_dataset;
use crate::util::content_hash_file;

const OFFLINE_REASON: &str = "offline: input is clean snapshot";

pub fn run(args: OfflineArgs) -> Result<()> {
    let ctx = PipelineContext::load(&args.root, args.config.as_deref())?;
    let clean_path = ctx.paths.resolve(&args.clean);
    check_clean_input(&clean_path)?;
    ctx.paths.ensure_dirs()?;

    let command = render_command(
        "offline",
        &args.root,
        args.config.as_deref(),
        &[("--clean", args.clean.as_path())],
    );
    let run_log = ctx.start_run_log(command)?;
    info!(
        root = %ctx.paths.root.display(),
        clean = %clean_path.display(),
        generated_utc = %run_log.generated_utc(),
        "starting offline run"
    );

    execute(&ctx, run_log, |run_log| offline_stages(&ctx, &clean_path, run_log))
}

fn check_clean_input(path: &Path) -> Result<(), PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::io(format!(
            "clean snapshot not found: {}",
            path.display()
        )));
    }
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(PipelineError::io(format!(
            "--clean must point to a .csv file: {}",
            path.display()
        )));
    }
    Ok(())
}

fn offline_stages(ctx: &PipelineContext, clean_path: &Path, run_log: &mut RunLog) -> Result<()> {
    let relative = ctx.paths.relative(clean_path);

    let mut data_source = ctx.data_source("NASA Exoplanet Archive (offline re-run)", "clean_snapshot");
    data_source.format = "csv".to_string();
    data_source.clean_snapshot_path = Some(relative.clone());
    run_log.set_data_source(data_source);
    run_log.set_http(HttpMeta::default());
    run_log.set_tap_usage(false, OFFLINE_REASON);

    let dataset = read_clean_dataset(clean_path, &ctx.config.metrics)?;
    let sha256 = content_hash_file(clean_path)?;
    run_log.record_clean_snapshot(relative, sha256, dataset.len());

    analyze_and_publish(ctx, &dataset, run_log)
}
