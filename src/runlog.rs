use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{
    BootstrapEcho, ColumnsEcho, DataSource, FiltersEcho, HttpMeta, Missingness, RowCounts,
    RunLogRecord, RunStatus, RuntimeInfo, Snapshots, TapUsage,
};
use crate::util::{content_hash_file, now_utc_string, write_json_pretty};

pub const UNKNOWN_COMMIT: &str = "UNKNOWN";

const TRACKED_LIBRARIES: &[&str] = &[
    "chrono",
    "clap",
    "csv",
    "image",
    "rand",
    "rand_xorshift",
    "reqwest",
    "rusqlite",
    "serde",
    "serde_json",
    "sha2",
    "toml",
    "tracing",
];

#[derive(Debug, Clone)]
pub struct RunLog {
    generated_utc: String,
    git_commit: String,
    runtime: RuntimeInfo,
    command: String,
    schema_hash: String,
    data_source: DataSource,
    http: HttpMeta,
    tap: TapUsage,
    filters: FiltersEcho,
    columns: ColumnsEcho,
    bootstrap: BootstrapEcho,
    row_counts: RowCounts,
    snapshots: Snapshots,
    missingness: Missingness,
    outputs: BTreeMap<String, String>,
    libraries: BTreeMap<String, String>,
    status: RunStatus,
    error_summary: Option<String>,
}

impl RunLog {
    pub fn new(config: &Config, root: &Path, command: impl Into<String>) -> Result<Self> {
        let runtime = RuntimeInfo {
            rustc: command_version_optional("rustc", &["--version"]),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let mut log = Self::with_identity(config, now_utc_string(), git_commit(root)?, runtime, command)?;
        log.libraries = collect_library_versions(root);
        Ok(log)
    }

    fn with_identity(
        config: &Config,
        generated_utc: String,
        git_commit: String,
        runtime: RuntimeInfo,
        command: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            generated_utc,
            git_commit,
            runtime,
            command: command.into(),
            schema_hash: config.schema_hash()?,
            data_source: DataSource::default(),
            http: HttpMeta::default(),
            tap: TapUsage {
                used: true,
                reason: String::new(),
            },
            filters: FiltersEcho {
                discoverymethod_in: config.filters.discoverymethod_in.clone(),
            },
            columns: ColumnsEcho {
                used: config.columns.used.clone(),
            },
            bootstrap: BootstrapEcho {
                seed: config.bootstrap.seed,
                n_resamples: config.bootstrap.n_resamples,
                ci: config.bootstrap.ci,
                baseline_method: config.analysis.baseline_method.clone(),
                quantile_method: config.bootstrap.quantile_method.clone(),
                min_group_size_for_ci: config.thresholds.min_group_size_for_ci,
                std_ddof: config.analysis.std_ddof,
            },
            row_counts: RowCounts::default(),
            snapshots: Snapshots::default(),
            missingness: Missingness::new(),
            outputs: BTreeMap::new(),
            libraries: BTreeMap::new(),
            status: RunStatus::Running,
            error_summary: None,
        })
    }

    pub fn generated_utc(&self) -> &str {
        &self.generated_utc
    }

    pub fn set_data_source(&mut self, data_source: DataSource) {
        self.data_source = data_source;
    }

    pub fn set_http(&mut self, http: HttpMeta) {
        self.http = http;
    }

    pub fn set_tap_usage(&mut self, used: bool, reason: impl Into<String>) {
        self.tap = TapUsage {
            used,
            reason: reason.into(),
        };
    }

    pub fn record_raw_snapshot(&mut self, path: impl Into<String>, sha256: impl Into<String>, rows: usize) {
        self.snapshots.raw_snapshot_path = Some(path.into());
        self.snapshots.raw_sha256 = Some(sha256.into());
        self.row_counts.raw = Some(rows);
    }

    pub fn record_clean_snapshot(&mut self, path: impl Into<String>, sha256: impl Into<String>, rows: usize) {
        self.snapshots.clean_snapshot_path = Some(path.into());
        self.snapshots.clean_sha256 = Some(sha256.into());
        self.row_counts.clean = Some(rows);
    }

    pub fn set_missingness(&mut self, missingness: Missingness) {
        self.missingness = missingness;
    }

    pub fn add_output(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.outputs.insert(key.into(), value.into());
    }

    pub fn finalize_success(&mut self) {
        self.status = RunStatus::Success;
        self.error_summary = None;
    }

    pub fn finalize_failure(&mut self, err: &anyhow::Error) {
        self.status = RunStatus::Failed;
        self.error_summary = Some(error_summary(err));
    }

    pub fn to_record(&self) -> RunLogRecord {
        RunLogRecord {
            generated_utc: self.generated_utc.clone(),
            git_commit: self.git_commit.clone(),
            runtime: self.runtime.clone(),
            command: self.command.clone(),
            data_source: self.data_source.clone(),
            http: self.http.clone(),
            tap: self.tap.clone(),
            filters: self.filters.clone(),
            columns: self.columns.clone(),
            row_counts: self.row_counts,
            schema_hash: self.schema_hash.clone(),
            bootstrap: self.bootstrap.clone(),
            snapshots: self.snapshots.clone(),
            missingness: self.missingness.clone(),
            outputs: self.outputs.clone(),
            libraries: self.libraries.clone(),
            status: self.status,
            error_summary: self.error_summary.clone(),
        }
    }

    // Overwrites any earlier record at `path`.
    pub fn write_json(&self, path: &Path) -> Result<RunLogRecord> {
        let record = self.to_record();
        write_json_pretty(path, &record)?;
        info!(
            path = %path.display(),
            status = record.status.as_str(),
            "wrote run log"
        );
        Ok(record)
    }
}

pub fn error_summary(err: &anyhow::Error) -> String {
    let rendered = format!("{err:#}");
    rendered
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

pub fn git_commit(root: &Path) -> Result<String> {
    let git_dir = root.join(".git");
    let Ok(head) = fs::read_to_string(git_dir.join("HEAD")) else {
        return Ok(UNKNOWN_COMMIT.to_string());
    };
    let head = head.trim();

    let hash = match head.strip_prefix("ref:") {
        Some(reference) => match fs::read_to_string(git_dir.join(reference.trim())) {
            Ok(contents) => contents.trim().to_string(),
            Err(_) => return Ok(UNKNOWN_COMMIT.to_string()),
        },
        None => head.to_string(),
    };

    let commit_regex = Regex::new(r"^[0-9a-f]{7,64}$").context("failed to compile commit regex")?;
    if commit_regex.is_match(&hash) {
        Ok(hash[..7].to_string())
    } else {
        Ok(UNKNOWN_COMMIT.to_string())
    }
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    version: String,
}

pub fn collect_library_versions(root: &Path) -> BTreeMap<String, String> {
    let lock_path = root.join("Cargo.lock");
    let Ok(content) = fs::read_to_string(&lock_path) else {
        return BTreeMap::new();
    };
    let lock: LockFile = match toml::from_str(&content) {
        Ok(lock) => lock,
        Err(err) => {
            warn!(path = %lock_path.display(), error = %err, "unreadable lockfile; libraries left empty");
            return BTreeMap::new();
        }
    };

    lock.package
        .into_iter()
        .filter(|package| TRACKED_LIBRARIES.contains(&package.name.as_str()))
        .map(|package| (package.name, package.version))
        .collect()
}

pub fn try_hash_lockfile(root: &Path) -> Result<Option<String>> {
    let lock_path = root.join("Cargo.lock");
    if !lock_path.is_file() {
        return Ok(None);
    }
    content_hash_file(&lock_path)
        .map(Some)
        .with_context(|| format!("failed to hash lockfile {}", lock_path.display()))
}
