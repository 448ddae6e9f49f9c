use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::Config;
use crate::util::{display_relative, ensure_directory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub data_raw_dir: PathBuf,
    pub data_clean_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub figures_dir: PathBuf,
    pub warehouse_path: PathBuf,
}

impl ProjectPaths {
    pub fn from_root(root: &Path, config: &Config) -> Self {
        let outputs = &config.outputs;
        Self {
            root: root.to_path_buf(),
            data_raw_dir: root.join(&outputs.data_raw_dir),
            data_clean_dir: root.join(&outputs.data_clean_dir),
            artifacts_dir: root.join(&outputs.artifacts_dir),
            figures_dir: root.join(&outputs.figures_dir),
            warehouse_path: root.join(&outputs.warehouse_path),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        ensure_directory(&self.data_raw_dir)?;
        ensure_directory(&self.data_clean_dir)?;
        ensure_directory(&self.artifacts_dir)?;
        ensure_directory(&self.figures_dir)?;
        if let Some(parent) = self.warehouse_path.parent() {
            ensure_directory(parent)?;
        }
        Ok(())
    }

    pub fn run_json(&self) -> PathBuf {
        self.artifacts_dir.join("run.json")
    }

    pub fn metrics_json(&self) -> PathBuf {
        self.artifacts_dir.join("metrics.json")
    }

    pub fn report_md(&self) -> PathBuf {
        self.artifacts_dir.join("report.md")
    }

    pub fn report_html(&self) -> PathBuf {
        self.artifacts_dir.join("report.html")
    }

    pub fn relative(&self, path: &Path) -> String {
        display_relative(path, &self.root)
    }

    pub fn relative_dir(&self, path: &Path) -> String {
        let rendered = self.relative(path);
        if rendered.ends_with('/') {
            rendered
        } else {
            format!("{rendered}/")
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
