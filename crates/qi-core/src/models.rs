use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QiError;
use crate::formatting::format_number;

// ── Cell ──────────────────────────────────────────────────────────────────────

/// A single value in a tabular dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    /// A value that parsed as a finite or infinite float.
    Number(f64),
    /// Anything that did not parse as a number.
    Text(String),
    /// Blank CSV cell, JSON `null`, or a key absent from the row.
    #[default]
    Empty,
}

impl Cell {
    /// Coerce raw cell text: trimmed, blank → [`Cell::Empty`], float-parsable
    /// (and not NaN) → [`Cell::Number`], otherwise [`Cell::Text`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if !n.is_nan() => Cell::Number(n),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    /// Convert a JSON scalar. Strings go through [`Cell::parse`]; nested
    /// arrays and objects are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            Value::String(s) => Cell::parse(s),
            Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Numeric value, if this cell holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Numeric value, with missing and non-numeric cells coerced to `0`.
    pub fn as_number_or_zero(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    pub fn is_number(&self) -> bool {
        self.as_number().is_some()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => f.write_str(&format_number(*n)),
            Cell::Text(s) => f.write_str(s),
            Cell::Empty => Ok(()),
        }
    }
}

impl From<&Cell> for Value {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Empty => Value::Null,
        }
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

/// One record: column name → cell.
pub type Row = BTreeMap<String, Cell>;

static EMPTY_CELL: Cell = Cell::Empty;

/// An ordered sequence of rows sharing one column set.
///
/// `columns` fixes the column order (CSV header order or the key order of the
/// first JSON object); every row carries exactly those keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<Map<String, Value>>",
    into = "Vec<Map<String, Value>>"
)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset, filling any column a row lacks with [`Cell::Empty`]
    /// and dropping keys that are not in `columns`.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.retain(|k, _| columns.contains(k));
                for col in &columns {
                    row.entry(col.clone()).or_default();
                }
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cell at (`row`, `column`); [`Cell::Empty`] when either is out of range.
    pub fn cell(&self, row: usize, column: &str) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Numeric series for `column`; non-numeric cells become `None`.
    pub fn series(&self, column: &str) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|r| r.get(column).and_then(Cell::as_number))
            .collect()
    }

    /// Display text of `column` for every row.
    pub fn labels(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.get(column).map(|c| c.to_string()).unwrap_or_default())
            .collect()
    }

    /// Append a column. `values` must have one cell per row; missing trailing
    /// cells are filled with [`Cell::Empty`]. A column that already exists is
    /// left untouched and `false` is returned.
    pub fn push_column(&mut self, name: &str, values: Vec<Cell>) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.columns.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(name.to_string(), values.next().unwrap_or_default());
        }
        true
    }

    /// Rows as JSON objects in column order.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).map(Value::from).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    /// Build from JSON objects; the first object's keys define the schema.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let columns: Vec<String> = records
            .first()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();

        let rows = records
            .iter()
            .map(|obj| {
                columns
                    .iter()
                    .map(|c| (c.clone(), obj.get(c).map(Cell::from_json).unwrap_or_default()))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }
}

impl TryFrom<Vec<Map<String, Value>>> for Dataset {
    type Error = QiError;

    fn try_from(records: Vec<Map<String, Value>>) -> Result<Self, Self::Error> {
        Ok(Self::from_records(&records))
    }
}

impl From<Dataset> for Vec<Map<String, Value>> {
    fn from(ds: Dataset) -> Self {
        ds.to_records()
    }
}

// ── ColumnManifest ────────────────────────────────────────────────────────────

/// Type of a column as observed in the first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
    Empty,
}

/// Name and kind of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// Explicit schema of a dataset, detected from its first row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnManifest {
    pub columns: Vec<ColumnInfo>,
    /// Column used for grouping and chart labels.
    pub date_column: Option<String>,
    /// `true` when no column name contains `date` and the first column was
    /// taken instead.
    pub date_column_inferred: bool,
}

impl ColumnManifest {
    /// Classify every column of `dataset` from its first row.
    pub fn detect(dataset: &Dataset) -> Self {
        let first = dataset.rows().first();
        let columns = dataset
            .columns()
            .iter()
            .map(|name| {
                let kind = match first.and_then(|r| r.get(name)) {
                    Some(Cell::Number(_)) => ColumnKind::Numeric,
                    Some(Cell::Text(_)) => ColumnKind::Text,
                    _ => ColumnKind::Empty,
                };
                ColumnInfo {
                    name: name.clone(),
                    kind,
                }
            })
            .collect();

        let named_date = dataset
            .columns()
            .iter()
            .find(|c| c.to_lowercase().contains("date"))
            .cloned();
        let date_column_inferred = named_date.is_none() && !dataset.columns().is_empty();
        let date_column = named_date.or_else(|| dataset.columns().first().cloned());

        if date_column_inferred {
            tracing::debug!(
                column = ?date_column,
                "no date-like column found; using the first column"
            );
        }

        Self {
            columns,
            date_column,
            date_column_inferred,
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    /// Numeric columns other than the date column, in column order.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Numeric)
            .filter(|c| Some(&c.name) != self.date_column.as_ref())
            .map(|c| c.name.as_str())
            .collect()
    }
}

// ── AggregationPeriod ─────────────────────────────────────────────────────────

/// Time bucket used before charting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPeriod {
    /// One point per input row (no bucketing).
    #[default]
    Daily,
    /// ISO-8601 weeks, keyed `YYYY-W##`.
    Weekly,
    /// Calendar months, keyed `YYYY-MM`.
    Monthly,
}

impl fmt::Display for AggregationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregationPeriod::Daily => "daily",
            AggregationPeriod::Weekly => "weekly",
            AggregationPeriod::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

// ── Intervention ──────────────────────────────────────────────────────────────

/// A dated annotation drawn on the chart (e.g. "New order set go-live").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: String,
    pub date: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl Intervention {
    /// Create an intervention with a fresh random id.
    pub fn new(
        date: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: date.into(),
            label: label.into(),
            description: description.into(),
        }
    }
}

// ── Project ───────────────────────────────────────────────────────────────────

pub const DEFAULT_X_AXIS_TITLE: &str = "Date";
pub const DEFAULT_Y_AXIS_TITLE: &str = "Rate (%)";

fn default_true() -> bool {
    true
}

fn default_x_title() -> String {
    DEFAULT_X_AXIS_TITLE.to_string()
}

fn default_y_title() -> String {
    DEFAULT_Y_AXIS_TITLE.to_string()
}

/// Chart settings stored with a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub selected_variables: Vec<String>,
    #[serde(default)]
    pub goal_value: Option<f64>,
    #[serde(default)]
    pub interventions: Vec<Intervention>,
    #[serde(default = "default_true")]
    pub show_median: bool,
    #[serde(default)]
    pub aggregation: AggregationPeriod,
    #[serde(default = "default_x_title")]
    pub x_axis_title: String,
    #[serde(default = "default_y_title")]
    pub y_axis_title: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            selected_variables: Vec::new(),
            goal_value: None,
            interventions: Vec::new(),
            show_median: true,
            aggregation: AggregationPeriod::Daily,
            x_axis_title: default_x_title(),
            y_axis_title: default_y_title(),
        }
    }
}

/// A saved QI project: metadata, its dataset and its chart settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Option<Dataset>,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl Project {
    /// Create an empty project with default settings.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
            data: None,
            settings: ProjectSettings::default(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
