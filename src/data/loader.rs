use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use crate::error::PipelineError;

use super::model::{MeasurementRow, MeasurementTable, Timestep};
use super::theme::extract_theme;

/// Raw theme column; `theme` is accepted in its place.
pub const THEME_RAW: &str = "theme_raw";
const THEME_FALLBACK: &str = "theme";

/// Every column besides the raw theme field.
pub const REQUIRED_COLUMNS: [&str; 12] = [
    "suggestion_type",
    "action_type",
    "outcome_type",
    "audience_name",
    "audience",
    "timestep_type",
    "timestep",
    "variable",
    "value",
    "lower_ci",
    "upper_ci",
    "se",
];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a measurement table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with the columns listed in [`REQUIRED_COLUMNS`]
/// * `.json`    – `[{ "audience": "...", "value": 1.0, ... }, ...]`
/// * `.parquet` – flat scalar columns (as written by `df.to_parquet()`)
///
/// Schema problems surface as a [`PipelineError::SchemaViolation`] inside the
/// returned error.
pub fn load_file(path: &Path) -> Result<MeasurementTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        "parquet" | "pq" => load_parquet(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    log::info!("loaded {} measurement rows from {}", table.len(), path.display());
    Ok(table)
}

// ---------------------------------------------------------------------------
// Format-independent row assembly
// ---------------------------------------------------------------------------

/// A single input cell, before typing into a [`MeasurementRow`] field.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
    Null,
}

/// Which physical column carries the raw theme.
#[derive(Debug, Clone, Copy)]
struct Layout {
    theme_column: &'static str,
}

impl Layout {
    fn resolve<'a>(columns: impl IntoIterator<Item = &'a str>) -> Result<Self, PipelineError> {
        let present: BTreeSet<&str> = columns.into_iter().collect();
        let theme_column = if present.contains(THEME_RAW) {
            THEME_RAW
        } else if present.contains(THEME_FALLBACK) {
            THEME_FALLBACK
        } else {
            return Err(PipelineError::schema(None, THEME_RAW, "required column is missing"));
        };
        if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !present.contains(**c)) {
            return Err(PipelineError::schema(None, *missing, "required column is missing"));
        }
        Ok(Self { theme_column })
    }

    fn build_row(&self, row: usize, cell: impl Fn(&str) -> Cell) -> Result<MeasurementRow, PipelineError> {
        let text = |column: &str| match cell(column) {
            Cell::Text(s) => s,
            Cell::Integer(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Null => String::new(),
        };
        let measure = |column: &str| match cell(column) {
            Cell::Float(f) => Ok(f),
            Cell::Integer(i) => Ok(i as f64),
            Cell::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                PipelineError::schema(Some(row), column, format!("'{s}' is not a number"))
            }),
            Cell::Null => Err(PipelineError::schema(Some(row), column, "missing value")),
        };
        let timestep = match cell("timestep") {
            Cell::Integer(i) => Timestep::Integer(i),
            Cell::Float(f) => Timestep::from_f64(f),
            Cell::Text(s) => Timestep::parse(&s),
            Cell::Null => Timestep::Text(String::new()),
        };

        Ok(MeasurementRow {
            suggestion_type: text("suggestion_type"),
            action_type: text("action_type"),
            outcome_type: text("outcome_type"),
            theme: extract_theme(&text(self.theme_column)),
            audience_name: text("audience_name"),
            audience: text("audience"),
            timestep_type: text("timestep_type"),
            timestep,
            variable: text("variable"),
            value: measure("value")?,
            lower_ci: measure("lower_ci")?,
            upper_ci: measure("upper_ci")?,
            se: measure("se")?,
        })
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one measurement per record.
/// Empty cells are nulls.
fn load_csv(path: &Path) -> Result<MeasurementTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let layout = Layout::resolve(headers.iter().map(String::as_str))?;
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let row = layout.build_row(row_no, |column| {
            match index.get(column).and_then(|&i| record.get(i)) {
                Some(v) if !v.is_empty() => Cell::Text(v.to_string()),
                _ => Cell::Null,
            }
        })?;
        rows.push(row);
    }

    Ok(MeasurementTable::new(rows)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "theme_raw": "theme_t1", "audience": "hcp", "timestep": 1, "value": 10.0, ... },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<MeasurementTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;
    let objects = records
        .iter()
        .enumerate()
        .map(|(i, rec)| {
            rec.as_object()
                .with_context(|| format!("Row {i} is not a JSON object"))
        })
        .collect::<Result<Vec<_>>>()?;

    let keys: BTreeSet<&str> = objects
        .iter()
        .flat_map(|obj| obj.keys().map(String::as_str))
        .collect();
    let layout = Layout::resolve(keys)?;

    let mut rows = Vec::with_capacity(objects.len());
    for (row_no, obj) in objects.iter().enumerate() {
        rows.push(layout.build_row(row_no, |column| json_to_cell(obj.get(column)))?);
    }

    Ok(MeasurementTable::new(rows)?)
}

fn json_to_cell(val: Option<&JsonValue>) -> Cell {
    match val {
        Some(JsonValue::String(s)) => Cell::Text(s.clone()),
        Some(JsonValue::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Cell::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Cell::Float(f)
            } else {
                Cell::Text(n.to_string())
            }
        }
        Some(JsonValue::Bool(b)) => Cell::Text(b.to_string()),
        Some(JsonValue::Null) | None => Cell::Null,
        Some(other) => Cell::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// A column cast to one of the three shapes the row builder understands.
enum TypedColumn {
    Integer(Int64Array),
    Float(Float64Array),
    Text(StringArray),
}

impl TypedColumn {
    fn from_array(col: &ArrayRef) -> Result<Self> {
        let dt = col.data_type();
        let typed = if dt.is_integer() {
            let arr = cast(col, &DataType::Int64).context("casting integer column")?;
            TypedColumn::Integer(arr.as_primitive::<Int64Type>().clone())
        } else if dt.is_floating() {
            let arr = cast(col, &DataType::Float64).context("casting float column")?;
            TypedColumn::Float(arr.as_primitive::<Float64Type>().clone())
        } else {
            let arr = cast(col, &DataType::Utf8)
                .with_context(|| format!("cannot read {dt:?} column as text"))?;
            TypedColumn::Text(arr.as_string::<i32>().clone())
        };
        Ok(typed)
    }

    fn cell(&self, row: usize) -> Cell {
        match self {
            TypedColumn::Integer(a) if a.is_valid(row) => Cell::Integer(a.value(row)),
            TypedColumn::Float(a) if a.is_valid(row) => Cell::Float(a.value(row)),
            TypedColumn::Text(a) if a.is_valid(row) => Cell::Text(a.value(row).to_string()),
            _ => Cell::Null,
        }
    }
}

/// Load a Parquet file of flat scalar columns.
///
/// Integer columns (any width) read as integers, floating columns as floats,
/// everything else (including dictionary-encoded categoricals) as text.
fn load_parquet(path: &Path) -> Result<MeasurementTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let layout = Layout::resolve(builder.schema().fields().iter().map(|f| f.name().as_str()))?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let columns: HashMap<&str, TypedColumn> = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, col)| {
                TypedColumn::from_array(col)
                    .with_context(|| format!("column '{}'", field.name()))
                    .map(|typed| (field.name().as_str(), typed))
            })
            .collect::<Result<_>>()?;

        for row in 0..batch.num_rows() {
            let row_no = rows.len();
            rows.push(layout.build_row(row_no, |column| {
                columns.get(column).map_or(Cell::Null, |c| c.cell(row))
            })?);
        }
    }

    Ok(MeasurementTable::new(rows)?)
}
