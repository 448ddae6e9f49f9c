use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::Config;
use crate::model::RunLogRecord;
use crate::paths::ProjectPaths;
use crate::warehouse::CLEAN_TABLE_NAME;

pub fn run(args: StatusArgs) -> Result<()> {
    let config = Config::load_optional(args.config.as_deref())?;
    let paths = ProjectPaths::from_root(&args.root, &config);
    let run_json = paths.run_json();

    info!(root = %args.root.display(), "status requested");

    if run_json.exists() {
        let record = read_run_log(&run_json)?;
        info!(
            generated_utc = %record.generated_utc,
            status = record.status.as_str(),
            git_commit = %record.git_commit,
            command = %record.command,
            source = %record.data_source.source,
            tap_used = record.tap.used,
            rows_raw = ?record.row_counts.raw,
            rows_clean = ?record.row_counts.clean,
            schema_hash = %record.schema_hash,
            clean_sha256 = %record.snapshots.clean_sha256.as_deref().unwrap_or_default(),
            outputs = record.outputs.len(),
            "loaded run log"
        );
        if let Some(summary) = &record.error_summary {
            warn!(error_summary = %summary, "last run failed");
        }
        let current_hash = config.schema_hash()?;
        if current_hash != record.schema_hash {
            warn!(
                recorded = %record.schema_hash,
                current = %current_hash,
                "config differs from the one recorded in the run log"
            );
        }
    } else {
        warn!(path = %run_json.display(), "run log missing");
    }

    if paths.warehouse_path.exists() {
        let conn = Connection::open(&paths.warehouse_path)
            .with_context(|| format!("failed to open {}", paths.warehouse_path.display()))?;
        let rows = count_rows(&conn).unwrap_or(0);
        info!(path = %paths.warehouse_path.display(), table = CLEAN_TABLE_NAME, rows, "warehouse status");
    } else {
        warn!(path = %paths.warehouse_path.display(), "warehouse file missing");
    }

    Ok(())
}

fn read_run_log(path: &Path) -> Result<RunLogRecord> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn count_rows(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {CLEAN_TABLE_NAME}"), [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn status_tolerates_an_empty_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        run(StatusArgs {
            root: dir.path().to_path_buf(),
            config: None,
        })
        .expect("status");
    }

    #[test]
    fn corrupt_run_log_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifacts = dir.path().join("artifacts");
        fs::create_dir_all(&artifacts).expect("artifacts");
        fs::write(artifacts.join("run.json"), "{not json").expect("write");

        let err = run(StatusArgs {
            root: PathBuf::from(dir.path()),
            config: None,
        })
        .expect_err("corrupt run log");
        assert!(format!("{err:#}").contains("failed to parse"));
    }
}
