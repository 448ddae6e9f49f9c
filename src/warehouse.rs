use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::info;

use crate::dataset::CleanDataset;
use crate::tap::identifier_regex;
use crate::util::ensure_directory;

pub const CLEAN_TABLE_NAME: &str = "clean_planets";

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn load_clean_dataset(dataset: &CleanDataset, warehouse_path: &Path) -> Result<()> {
    let identifier = identifier_regex()?;
    if let Some(bad) = dataset.metrics.iter().find(|metric| !identifier.is_match(metric)) {
        bail!("metric column {bad:?} is not a valid SQL identifier");
    }
    if let Some(parent) = warehouse_path.parent() {
        ensure_directory(parent)?;
    }

    let mut connection = Connection::open(warehouse_path)
        .with_context(|| format!("failed to open {}", warehouse_path.display()))?;
    configure_connection(&connection)?;

    let mut columns = vec![
        "pl_name TEXT".to_string(),
        "discoverymethod TEXT".to_string(),
        "pl_bmassprov TEXT".to_string(),
        "disc_year INTEGER".to_string(),
    ];
    columns.extend(dataset.metrics.iter().map(|metric| format!("{metric} REAL")));
    let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();

    let tx = connection.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {CLEAN_TABLE_NAME};\nCREATE TABLE {CLEAN_TABLE_NAME} ({});",
        columns.join(", ")
    ))
    .with_context(|| format!("failed to recreate {CLEAN_TABLE_NAME}"))?;

    {
        let mut statement = tx.prepare(&format!(
            "INSERT INTO {CLEAN_TABLE_NAME} VALUES({})",
            placeholders.join(", ")
        ))?;

        for row in &dataset.rows {
            let mut values = vec![text(&row.name), text(&row.method), text(&row.mass_provenance)];
            values.push(row.disc_year.map_or(Value::Null, Value::Integer));
            values.extend(row.values.iter().map(|value| value.map_or(Value::Null, Value::Real)));
            statement.execute(params_from_iter(values))?;
        }
    }

    tx.commit()?;
    info!(
        path = %warehouse_path.display(),
        table = CLEAN_TABLE_NAME,
        rows = dataset.len(),
        "loaded warehouse"
    );
    Ok(())
}

fn text(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RawTable;

    fn dataset_with_metric(metric: &str, rows: &[[&str; 5]]) -> CleanDataset {
        let raw = RawTable {
            columns: ["pl_name", "discoverymethod", "pl_bmassprov", "disc_year", metric]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows: rows
                .iter()
                .map(|cells| cells.iter().map(|c| (!c.is_empty()).then(|| c.to_string())).collect())
                .collect(),
        };
        CleanDataset::from_table(&raw, &[metric.to_string()]).expect("dataset")
    }

    fn dataset(rows: &[[&str; 5]]) -> CleanDataset {
        dataset_with_metric("pl_rade", rows)
    }

    #[test]
    fn load_replaces_previous_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warehouse").join("warehouse.sqlite");

        let first = dataset(&[["a", "Transit", "Mass", "2010", "1.5"], ["b", "Imaging", "", "", ""]]);
        load_clean_dataset(&first, &path).expect("first load");
        let second = dataset(&[["c", "Transit", "Msini", "2020", "2.5"]]);
        load_clean_dataset(&second, &path).expect("second load");

        let connection = Connection::open(&path).expect("open");
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM clean_planets", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);

        let (name, year, rade): (String, Option<i64>, Option<f64>) = connection
            .query_row("SELECT pl_name, disc_year, pl_rade FROM clean_planets", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .expect("row");
        assert_eq!(name, "c");
        assert_eq!(year, Some(2020));
        assert_eq!(rade, Some(2.5));
    }

    #[test]
    fn nulls_are_stored_as_sql_null() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warehouse.sqlite");
        load_clean_dataset(&dataset(&[["b", "Imaging", "", "", ""]]), &path).expect("load");

        let connection = Connection::open(&path).expect("open");
        let nulls: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM clean_planets WHERE pl_bmassprov IS NULL AND pl_rade IS NULL AND disc_year IS NULL",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(nulls, 1);
    }

    #[test]
    fn non_identifier_metric_is_rejected_before_opening_the_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warehouse.sqlite");
        let data = dataset_with_metric("pl-rade", &[["a", "Transit", "Mass", "2010", "1.5"]]);

        let err = load_clean_dataset(&data, &path).expect_err("bad metric name");
        assert!(format!("{err:#}").contains("\"pl-rade\" is not a valid SQL identifier"));
        assert!(!path.exists());
    }
}
