use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::content_hash_text;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapConfig {
    pub endpoint: String,
    pub table: String,
    pub fmt: String,
    pub mode: String,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://exoplanetarchive.ipac.caltech.edu/TAP".to_string(),
            table: "pscomppars".to_string(),
            fmt: "csv".to_string(),
            mode: "sync".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersConfig {
    pub discoverymethod_in: Vec<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            discoverymethod_in: default_methods(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnsConfig {
    pub used: Vec<String>,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            used: strings(&[
                "pl_name",
                "discoverymethod",
                "disc_year",
                "pl_rade",
                "pl_orbper",
                "pl_bmasse",
                "pl_bmassprov",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapConfig {
    pub seed: u64,
    pub n_resamples: usize,
    pub ci: f64,
    pub quantile_method: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            seed: 18_790_314,
            n_resamples: 10_000,
            ci: 0.95,
            quantile_method: "linear".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub baseline_method: String,
    pub std_ddof: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            baseline_method: "Transit".to_string(),
            std_ddof: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdsConfig {
    pub min_group_size: usize,
    pub min_group_size_for_ci: usize,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            min_group_size: 2,
            min_group_size_for_ci: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputsConfig {
    pub data_raw_dir: String,
    pub data_clean_dir: String,
    pub artifacts_dir: String,
    pub figures_dir: String,
    pub warehouse_path: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            data_raw_dir: "data/raw".to_string(),
            data_clean_dir: "data/clean".to_string(),
            artifacts_dir: "artifacts".to_string(),
            figures_dir: "artifacts/figures".to_string(),
            warehouse_path: "warehouse/warehouse.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub tap: TapConfig,
    pub filters: FiltersConfig,
    pub columns: ColumnsConfig,
    pub metrics: Vec<String>,
    pub method_order: Vec<String>,
    pub bootstrap: BootstrapConfig,
    pub analysis: AnalysisConfig,
    pub thresholds: ThresholdsConfig,
    pub outputs: OutputsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tap: TapConfig::default(),
            filters: FiltersConfig::default(),
            columns: ColumnsConfig::default(),
            metrics: strings(&["pl_rade", "pl_orbper", "pl_bmasse"]),
            method_order: default_methods(),
            bootstrap: BootstrapConfig::default(),
            analysis: AnalysisConfig::default(),
            thresholds: ThresholdsConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: ConfigFile = toml::from_str(content)?;
        Ok(overrides.merge_into(Self::default()))
    }

    pub fn canonical_json(&self) -> Result<String> {
        // serde_json::Value keeps object keys sorted.
        let value = serde_json::to_value(self).context("failed to serialize config")?;
        serde_json::to_string(&value).context("failed to render canonical config")
    }

    pub fn schema_hash(&self) -> Result<String> {
        Ok(content_hash_text(&self.canonical_json()?))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    tap: TapSection,
    #[serde(default)]
    filters: FiltersSection,
    #[serde(default)]
    columns: ColumnsSection,
    metrics: Option<ListSection>,
    method_order: Option<ListSection>,
    #[serde(default)]
    bootstrap: BootstrapSection,
    #[serde(default)]
    analysis: AnalysisSection,
    #[serde(default)]
    thresholds: ThresholdsSection,
    #[serde(default)]
    outputs: OutputsSection,
}

#[derive(Debug, Default, Deserialize)]
struct TapSection {
    endpoint: Option<String>,
    table: Option<String>,
    format: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FiltersSection {
    discoverymethod_in: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ColumnsSection {
    used: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ListSection {
    list: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct BootstrapSection {
    seed: Option<u64>,
    n_resamples: Option<usize>,
    ci: Option<f64>,
    quantile_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisSection {
    baseline_method: Option<String>,
    std_ddof: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdsSection {
    min_group_size: Option<usize>,
    min_group_size_for_ci: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputsSection {
    data_raw_dir: Option<String>,
    data_clean_dir: Option<String>,
    artifacts_dir: Option<String>,
    figures_dir: Option<String>,
    warehouse_path: Option<String>,
}

impl ConfigFile {
    fn merge_into(self, mut config: Config) -> Config {
        override_with(&mut config.tap.endpoint, self.tap.endpoint);
        override_with(&mut config.tap.table, self.tap.table);
        override_with(&mut config.tap.fmt, self.tap.format);
        override_with(&mut config.tap.mode, self.tap.mode);

        override_with(
            &mut config.filters.discoverymethod_in,
            self.filters.discoverymethod_in,
        );
        override_with(&mut config.columns.used, self.columns.used);
        override_with(&mut config.metrics, self.metrics.and_then(|s| s.list));
        override_with(
            &mut config.method_order,
            self.method_order.and_then(|s| s.list),
        );

        override_with(&mut config.bootstrap.seed, self.bootstrap.seed);
        override_with(&mut config.bootstrap.n_resamples, self.bootstrap.n_resamples);
        override_with(&mut config.bootstrap.ci, self.bootstrap.ci);
        override_with(
            &mut config.bootstrap.quantile_method,
            self.bootstrap.quantile_method,
        );

        override_with(
            &mut config.analysis.baseline_method,
            self.analysis.baseline_method,
        );
        override_with(&mut config.analysis.std_ddof, self.analysis.std_ddof);

        override_with(
            &mut config.thresholds.min_group_size,
            self.thresholds.min_group_size,
        );
        override_with(
            &mut config.thresholds.min_group_size_for_ci,
            self.thresholds.min_group_size_for_ci,
        );

        override_with(&mut config.outputs.data_raw_dir, self.outputs.data_raw_dir);
        override_with(&mut config.outputs.data_clean_dir, self.outputs.data_clean_dir);
        override_with(&mut config.outputs.artifacts_dir, self.outputs.artifacts_dir);
        override_with(&mut config.outputs.figures_dir, self.outputs.figures_dir);
        override_with(&mut config.outputs.warehouse_path, self.outputs.warehouse_path);

        config
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn default_methods() -> Vec<String> {
    strings(&["Transit", "Radial Velocity", "Imaging", "Microlensing"])
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
