use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::analyze::{AnalysisRequest, compute_metrics};
use crate::clean::compute_missingness;
use crate::config::Config;
use crate::dataset::CleanDataset;
use crate::model::DataSource;
use crate::paths::ProjectPaths;
use crate::plots::generate_all_plots;
use crate::report::write_report_files;
use crate::runlog::{RunLog, try_hash_lockfile};
use crate::util::write_json_pretty;
use crate::warehouse::load_clean_dataset;

pub(crate) struct PipelineContext {
    pub config: Config,
    pub paths: ProjectPaths,
}

impl PipelineContext {
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_optional(config_path)?;
        let paths = ProjectPaths::from_root(root, &config);
        Ok(Self { config, paths })
    }

    pub fn start_run_log(&self, command: String) -> Result<RunLog> {
        let mut run_log = RunLog::new(&self.config, &self.paths.root, command)?;
        if let Some(lock_sha) = try_hash_lockfile(&self.paths.root)? {
            run_log.add_output("cargo_lock_sha256", lock_sha);
        }
        Ok(run_log)
    }

    pub fn data_source(&self, name: &str, source: &str) -> DataSource {
        let tap = &self.config.tap;
        DataSource {
            name: name.to_string(),
            table: tap.table.clone(),
            endpoint: tap.endpoint.clone(),
            mode: tap.mode.clone(),
            format: tap.fmt.clone(),
            source: source.to_string(),
            ..DataSource::default()
        }
    }
}

pub(crate) fn render_command(
    subcommand: &str,
    root: &Path,
    config: Option<&Path>,
    extra: &[(&str, &Path)],
) -> String {
    let mut command = vec![
        "exoplanet-report".to_string(),
        subcommand.to_string(),
        "--root".to_string(),
        root.display().to_string(),
    ];
    if let Some(path) = config {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    for (flag, value) in extra {
        command.push(flag.to_string());
        command.push(value.display().to_string());
    }
    command.join(" ")
}

pub(crate) fn analyze_and_publish(
    ctx: &PipelineContext,
    dataset: &CleanDataset,
    run_log: &mut RunLog,
) -> Result<()> {
    let config = &ctx.config;
    let paths = &ctx.paths;

    let missingness = compute_missingness(dataset, &config.method_order, &config.metrics);
    run_log.set_missingness(missingness.clone());

    load_clean_dataset(dataset, &paths.warehouse_path)?;

    let metrics = compute_metrics(dataset, &AnalysisRequest::from_config(config))?;
    let metrics_json = paths.metrics_json();
    write_json_pretty(&metrics_json, &metrics)?;
    info!(path = %metrics_json.display(), metrics = metrics.metrics.len(), "wrote metrics");

    let figures = generate_all_plots(
        dataset,
        &missingness,
        &config.metrics,
        &config.method_order,
        &paths.figures_dir,
    )?;

    run_log.add_output("report_md", paths.relative(&paths.report_md()));
    run_log.add_output("report_html", paths.relative(&paths.report_html()));
    run_log.add_output("metrics_json", paths.relative(&metrics_json));
    run_log.add_output("figures_dir", paths.relative_dir(&paths.figures_dir));
    run_log.add_output("warehouse", paths.relative(&paths.warehouse_path));
    for figure in &figures {
        if let Some(stem) = figure.file_stem().and_then(|stem| stem.to_str()) {
            run_log.add_output(format!("figure_{stem}"), paths.relative(figure));
        }
    }
    Ok(())
}

// run.json is written with status success before the report is rendered from
// it. Any later failure rewrites it with status failed.
pub(crate) fn execute<F>(ctx: &PipelineContext, mut run_log: RunLog, stages: F) -> Result<()>
where
    F: FnOnce(&mut RunLog) -> Result<()>,
{
    let paths = &ctx.paths;
    let run_json = paths.run_json();

    let outcome = stages(&mut run_log).and_then(|()| {
        run_log.finalize_success();
        run_log.write_json(&run_json)?;
        write_report_files(
            &run_json,
            &paths.metrics_json(),
            &paths.report_md(),
            &paths.report_html(),
        )
    });

    if let Err(err) = outcome {
        run_log.finalize_failure(&err);
        if let Err(write_err) = run_log.write_json(&run_json) {
            error!(path = %run_json.display(), error = %write_err, "failed to persist failed run log");
        }
        return Err(err);
    }

    info!(run_json = %run_json.display(), "pipeline finished");
    Ok(())
}
