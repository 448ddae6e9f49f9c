use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::dataset::{CleanDataset, ID_COLUMN, METHOD_COLUMN, PROVENANCE_COLUMN, RawTable, YEAR_COLUMN};
use crate::util::{content_hash_file, ensure_directory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub sha256: String,
    pub rows: usize,
}

pub fn compact_stamp(generated_utc: &str) -> String {
    generated_utc.chars().filter(|c| *c != '-' && *c != ':').collect()
}

pub fn parse_csv_bytes(bytes: &[u8]) -> Result<RawTable> {
    read_table(csv::ReaderBuilder::new().flexible(true).from_reader(bytes))
}

pub fn read_csv_file(path: &Path) -> Result<RawTable> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open csv {}", path.display()))?;
    read_table(reader).with_context(|| format!("failed to parse csv {}", path.display()))
}

fn read_table<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<RawTable> {
    let columns: Vec<String> = reader
        .headers()
        .context("failed to read csv header")?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read csv record {}", index + 1))?;
        let row = (0..columns.len())
            .map(|column| {
                record
                    .get(column)
                    .filter(|cell| !cell.trim().is_empty())
                    .map(str::to_string)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

pub fn write_raw_snapshot(raw: &RawTable, out_dir: &Path, table: &str, stamp: &str) -> Result<SnapshotFile> {
    let path = out_dir.join(format!("{table}_{stamp}.csv"));
    let mut writer = open_writer(&path)?;
    writer
        .write_record(&raw.columns)
        .with_context(|| format!("failed to write header to {}", path.display()))?;
    for row in &raw.rows {
        writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    finish(writer, path, raw.len(), "raw")
}

pub fn write_clean_dataset(
    dataset: &CleanDataset,
    out_dir: &Path,
    table: &str,
    stamp: &str,
) -> Result<SnapshotFile> {
    let path = out_dir.join(format!("{table}_clean_{stamp}.csv"));
    let mut writer = open_writer(&path)?;

    let mut header = vec![ID_COLUMN, METHOD_COLUMN, PROVENANCE_COLUMN];
    if dataset.has_year {
        header.push(YEAR_COLUMN);
    }
    header.extend(dataset.metrics.iter().map(String::as_str));
    writer
        .write_record(&header)
        .with_context(|| format!("failed to write header to {}", path.display()))?;

    for row in &dataset.rows {
        let mut record = vec![
            row.name.clone().unwrap_or_default(),
            row.method.clone().unwrap_or_default(),
            row.mass_provenance.clone().unwrap_or_default(),
        ];
        if dataset.has_year {
            record.push(row.disc_year.map(|year| year.to_string()).unwrap_or_default());
        }
        record.extend(
            row.values
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer
            .write_record(&record)
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    finish(writer, path, dataset.len(), "clean")
}

pub fn read_clean_dataset(path: &Path, metrics: &[String]) -> Result<CleanDataset> {
    let raw = read_csv_file(path)?;
    CleanDataset::from_table(&raw, metrics)
        .with_context(|| format!("clean snapshot {} does not match the data contract", path.display()))
}

fn open_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    csv::Writer::from_path(path).with_context(|| format!("failed to create csv {}", path.display()))
}

fn finish(mut writer: csv::Writer<File>, path: PathBuf, rows: usize, kind: &str) -> Result<SnapshotFile> {
    writer
        .flush()
        .with_context(|| format!("failed to flush csv {}", path.display()))?;
    drop(writer);

    let sha256 = content_hash_file(&path)?;
    info!(path = %path.display(), rows, kind, "wrote snapshot");
    Ok(SnapshotFile { path, sha256, rows })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::util::content_hash_text;

    const CSV: &str = "pl_name,discoverymethod,pl_bmassprov,disc_year,pl_rade\n\
                       Kepler-1 b,Transit,Mass,2009,1.5\n\
                       \"HD 1, b\",Radial Velocity,,2001,\n";

    #[test]
    fn parse_csv_bytes_treats_empty_cells_as_null() {
        let table = parse_csv_bytes(CSV.as_bytes()).expect("parse");
        assert_eq!(table.columns, vec!["pl_name", "discoverymethod", "pl_bmassprov", "disc_year", "pl_rade"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][0].as_deref(), Some("HD 1, b"));
        assert_eq!(table.rows[1][2], None);
        assert_eq!(table.rows[1][4], None);
    }

    #[test]
    fn compact_stamp_drops_separators() {
        assert_eq!(compact_stamp("2026-01-02T03:04:05Z"), "20260102T030405Z");
    }

    #[test]
    fn raw_snapshot_hash_matches_file_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = parse_csv_bytes(CSV.as_bytes()).expect("parse");
        let snapshot = write_raw_snapshot(&table, &dir.path().join("raw"), "pscomppars", "20260102T030405Z")
            .expect("write");

        assert!(snapshot.path.ends_with("raw/pscomppars_20260102T030405Z.csv"));
        assert_eq!(snapshot.rows, 2);
        let bytes = fs::read_to_string(&snapshot.path).expect("read");
        assert_eq!(snapshot.sha256, content_hash_text(&bytes));
        assert_eq!(parse_csv_bytes(bytes.as_bytes()).expect("reparse"), table);
    }

    #[test]
    fn clean_snapshot_reloads_to_the_same_dataset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metrics = vec!["pl_rade".to_string()];
        let table = parse_csv_bytes(CSV.as_bytes()).expect("parse");
        let dataset = CleanDataset::from_table(&table, &metrics).expect("dataset");

        let snapshot = write_clean_dataset(&dataset, dir.path(), "pscomppars", "20260102T030405Z")
            .expect("write");
        assert!(snapshot.path.ends_with("pscomppars_clean_20260102T030405Z.csv"));
        assert!(snapshot.sha256.starts_with("sha256:"));

        let reloaded = read_clean_dataset(&snapshot.path, &metrics).expect("reload");
        assert_eq!(reloaded, dataset);
    }

    #[test]
    fn reading_clean_snapshot_without_metric_column_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clean.csv");
        fs::write(&path, "pl_name,discoverymethod,pl_bmassprov\na,Transit,Mass\n").expect("write");
        let err = read_clean_dataset(&path, &["pl_rade".to_string()]).expect_err("schema");
        assert!(format!("{err:#}").contains("missing required columns: pl_rade"));
    }
}
