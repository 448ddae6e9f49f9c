use crate::error::PipelineError;

pub const ID_COLUMN: &str = "pl_name";
pub const METHOD_COLUMN: &str = "discoverymethod";
pub const PROVENANCE_COLUMN: &str = "pl_bmassprov";
pub const YEAR_COLUMN: &str = "disc_year";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn missing_columns<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required
            .into_iter()
            .filter(|name| self.column_index(name).is_none())
            .map(str::to_string)
            .collect()
    }

    fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanetRow {
    pub name: Option<String>,
    pub method: Option<String>,
    pub mass_provenance: Option<String>,
    pub disc_year: Option<i64>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanDataset {
    pub metrics: Vec<String>,
    pub has_year: bool,
    pub rows: Vec<PlanetRow>,
}

impl CleanDataset {
    pub fn from_table(table: &RawTable, metrics: &[String]) -> Result<Self, PipelineError> {
        let required = [ID_COLUMN, METHOD_COLUMN, PROVENANCE_COLUMN]
            .into_iter()
            .chain(metrics.iter().map(String::as_str));
        let missing = table.missing_columns(required);
        if !missing.is_empty() {
            return Err(PipelineError::Schema { missing });
        }

        let lookup = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| PipelineError::Schema {
                    missing: vec![name.to_string()],
                })
        };
        let id_index = lookup(ID_COLUMN)?;
        let method_index = lookup(METHOD_COLUMN)?;
        let provenance_index = lookup(PROVENANCE_COLUMN)?;
        let year_index = table.column_index(YEAR_COLUMN);
        let metric_indexes = metrics
            .iter()
            .map(|metric| lookup(metric))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = (0..table.len())
            .map(|row| PlanetRow {
                name: table.cell(row, id_index).map(str::to_string),
                method: table.cell(row, method_index).map(str::to_string),
                mass_provenance: table.cell(row, provenance_index).map(str::to_string),
                disc_year: year_index.and_then(|column| parse_year(table.cell(row, column)?)),
                values: metric_indexes
                    .iter()
                    .map(|&column| parse_metric(table.cell(row, column)?))
                    .collect(),
            })
            .collect();

        Ok(Self {
            metrics: metrics.to_vec(),
            has_year: year_index.is_some(),
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn metric_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|name| name == metric)
    }

    pub fn group<'a>(&'a self, method: &'a str) -> impl Iterator<Item = &'a PlanetRow> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.method.as_deref() == Some(method))
    }

    pub fn group_size(&self, method: &str) -> usize {
        self.group(method).count()
    }

    pub fn sample(&self, method: &str, metric_index: usize) -> Vec<f64> {
        self.group(method)
            .filter_map(|row| row.values.get(metric_index).copied().flatten())
            .collect()
    }

    pub fn contains_method(&self, method: &str) -> bool {
        self.group(method).next().is_some()
    }
}

pub fn parse_metric(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

// Integral floats such as 2015.0 are accepted.
pub fn parse_year(cell: &str) -> Option<i64> {
    let trimmed = cell.trim();
    if let Ok(year) = trimmed.parse::<i64>() {
        return Some(year);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.fract() == 0.0)
        .map(|value| value as i64)
}
