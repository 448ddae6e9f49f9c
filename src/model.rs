use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::stats::{BootstrapResult, QuantileMethod, SummaryStats};

#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string-keyed map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MissingnessEntry {
    pub n_total: usize,
    pub n_nonnull: usize,
    pub missing_rate: f64,
}

pub type Missingness = OrderedMap<OrderedMap<MissingnessEntry>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassProvenanceCounts {
    #[serde(rename = "Msini")]
    pub msini: usize,
    #[serde(rename = "Mass")]
    pub mass: usize,
    #[serde(rename = "Other")]
    pub other: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub std_ddof: usize,
    pub quantile_method: QuantileMethod,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MassProvenanceSection {
    pub by_method: OrderedMap<MassProvenanceCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary {
    #[serde(flatten)]
    pub counts: MissingnessEntry,
    #[serde(flatten)]
    pub stats: SummaryStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    pub units: String,
    pub by_method: OrderedMap<MethodSummary>,
    pub diff_vs_baseline: OrderedMap<BootstrapResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub generated_utc: String,
    pub baseline_method: String,
    pub method_order: Vec<String>,
    pub analysis: AnalysisSettings,
    pub mass_provenance: MassProvenanceSection,
    pub metrics: OrderedMap<MetricBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub rustc: Option<String>,
    pub crate_version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub table: String,
    pub endpoint: String,
    pub mode: String,
    pub format: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_snapshot_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapUsage {
    pub used: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltersEcho {
    pub discoverymethod_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnsEcho {
    pub used: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowCounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapEcho {
    pub seed: u64,
    pub n_resamples: usize,
    pub ci: f64,
    pub baseline_method: String,
    pub quantile_method: String,
    pub min_group_size_for_ci: usize,
    pub std_ddof: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_snapshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_snapshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub generated_utc: String,
    pub git_commit: String,
    pub runtime: RuntimeInfo,
    pub command: String,
    pub data_source: DataSource,
    pub http: HttpMeta,
    pub tap: TapUsage,
    pub filters: FiltersEcho,
    pub columns: ColumnsEcho,
    pub row_counts: RowCounts,
    pub schema_hash: String,
    pub bootstrap: BootstrapEcho,
    pub snapshots: Snapshots,
    pub missingness: Missingness,
    pub outputs: BTreeMap<String, String>,
    pub libraries: BTreeMap<String, String>,
    pub status: RunStatus,
    pub error_summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_preserves_insertion_order_through_json() {
        let mut map = OrderedMap::new();
        map.insert("Transit", 1);
        map.insert("Imaging", 2);
        map.insert("Astrometry", 3);
        map.insert("Imaging", 20);

        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"Transit":1,"Imaging":20,"Astrometry":3}"#);

        let parsed: OrderedMap<i32> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, map);
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["Transit", "Imaging", "Astrometry"]);
    }

    #[test]
    fn method_summary_flattens_counts_and_stats() {
        let summary = MethodSummary {
            counts: MissingnessEntry {
                n_total: 4,
                n_nonnull: 0,
                missing_rate: 1.0,
            },
            stats: SummaryStats::default(),
        };
        let value = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(value["n_total"], 4);
        assert_eq!(value["missing_rate"], 1.0);
        assert!(value["p50"].is_null());

        let parsed: MethodSummary = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, summary);
    }

    #[test]
    fn empty_http_meta_serializes_as_empty_object() {
        assert_eq!(serde_json::to_string(&HttpMeta::default()).expect("serialize"), "{}");
    }

    #[test]
    fn mass_provenance_counts_use_bucket_names() {
        let counts = MassProvenanceCounts {
            msini: 1,
            mass: 2,
            other: 3,
        };
        assert_eq!(
            serde_json::to_string(&counts).expect("serialize"),
            r#"{"Msini":1,"Mass":2,"Other":3}"#
        );
    }
}
