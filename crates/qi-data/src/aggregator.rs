//! Period bucketing of datasets (daily / ISO-weekly / monthly).

use std::collections::BTreeMap;

use qi_core::formatting::round2;
use qi_core::models::{AggregationPeriod, Cell, ColumnManifest, Dataset, Row};
use qi_core::time_utils::{parse_date, period_key};
use tracing::{debug, warn};

/// Bucket key for rows whose date cell is blank.
const UNKNOWN_BUCKET: &str = "unknown";

/// Stateless helper that groups dataset rows by time period.
pub struct TemporalAggregator;

impl TemporalAggregator {
    /// Aggregate `dataset` by `period`.
    ///
    /// Daily returns the input unchanged. Otherwise each output row holds the
    /// period key in the date column plus the 2-decimal mean of every numeric
    /// column (as classified from the first row); text columns are dropped.
    /// Keys ascend lexically, which is chronological for `YYYY-W##` and
    /// `YYYY-MM`.
    pub fn aggregate(dataset: &Dataset, period: AggregationPeriod) -> Dataset {
        if period == AggregationPeriod::Daily || dataset.is_empty() {
            return dataset.clone();
        }

        let manifest = ColumnManifest::detect(dataset);
        let Some(date_column) = manifest.date_column.clone() else {
            return dataset.clone();
        };
        Self::aggregate_by(dataset, &date_column, &manifest.numeric_columns(), |raw| {
            Self::bucket_key(raw, period)
        })
    }

    /// Weekly shorthand for [`TemporalAggregator::aggregate`].
    pub fn aggregate_weekly(dataset: &Dataset) -> Dataset {
        Self::aggregate(dataset, AggregationPeriod::Weekly)
    }

    /// Monthly shorthand for [`TemporalAggregator::aggregate`].
    pub fn aggregate_monthly(dataset: &Dataset) -> Dataset {
        Self::aggregate(dataset, AggregationPeriod::Monthly)
    }

    /// Map a date cell to its bucket key.
    ///
    /// Cells that are not dates fall into a bucket named after their own
    /// text so every row still lands in exactly one bucket.
    pub fn bucket_key(cell: &Cell, period: AggregationPeriod) -> String {
        let text = cell.to_string();
        match parse_date(&text) {
            Some(date) => period_key(date, period),
            None if text.trim().is_empty() => UNKNOWN_BUCKET.to_string(),
            None => {
                warn!("unparseable date {:?}; bucketing under its raw text", text);
                text.trim().to_string()
            }
        }
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Generic aggregation driver.
    ///
    /// `key_fn` maps the date cell of a row to its string period key.
    fn aggregate_by(
        dataset: &Dataset,
        date_column: &str,
        numeric_columns: &[&str],
        key_fn: impl Fn(&Cell) -> String,
    ) -> Dataset {
        let mut groups: BTreeMap<String, Vec<&Row>> = BTreeMap::new();
        for row in dataset.rows() {
            let key = key_fn(row.get(date_column).unwrap_or(&Cell::Empty));
            groups.entry(key).or_default().push(row);
        }

        let rows: Vec<Row> = groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = Row::new();
                out.insert(date_column.to_string(), Cell::Text(key));
                for &col in numeric_columns {
                    out.insert(col.to_string(), Self::mean_cell(&members, col));
                }
                out
            })
            .collect();

        let mut columns = vec![date_column.to_string()];
        columns.extend(numeric_columns.iter().map(|c| c.to_string()));

        debug!(
            input_rows = dataset.len(),
            buckets = rows.len(),
            "aggregated dataset"
        );
        Dataset::new(columns, rows)
    }

    /// Rounded mean of the numeric cells of `column`, or empty when none.
    fn mean_cell(rows: &[&Row], column: &str) -> Cell {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.get(column).and_then(Cell::as_number))
            .collect();
        if values.is_empty() {
            return Cell::Empty;
        }
        Cell::Number(round2(values.iter().sum::<f64>() / values.len() as f64))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
