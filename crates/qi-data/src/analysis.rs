//! End-to-end pipeline: ingest → derive → aggregate → segment → assemble.

use std::collections::BTreeMap;
use std::path::Path;

use qi_core::error::{QiError, Result};
use qi_core::models::{ColumnManifest, Dataset, ProjectSettings};
use tracing::debug;

use crate::aggregator::TemporalAggregator;
use crate::median::{segment_series, Segmentation};
use crate::metrics::{derive_metrics, DerivedMetricReport, MetricRuleSet};
use crate::reader;
use crate::series::{assemble, AssemblyInput, ChartBundle};

/// Result of loading one data file.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    /// Parsed rows with derived rate columns appended.
    pub dataset: Dataset,
    /// One entry per derived column that was added.
    pub derived: Vec<DerivedMetricReport>,
}

/// Parse `content` (format by `filename`) and apply the metric rules.
pub fn ingest(content: &str, filename: &str, rules: &MetricRuleSet) -> Result<Ingested> {
    let parsed = reader::parse_content(content, filename)?;
    let (dataset, derived) = derive_metrics(&parsed, rules);
    Ok(Ingested { dataset, derived })
}

/// [`ingest`] a file from disk.
pub fn ingest_file(path: &Path, rules: &MetricRuleSet) -> Result<Ingested> {
    let content = std::fs::read_to_string(path).map_err(|source| QiError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    ingest(&content, &path.to_string_lossy(), rules)
}

/// Build the chart for `dataset` under `settings`.
///
/// Returns `None` when there is nothing to draw: no rows, or none of the
/// selected variables is a column of the (aggregated) dataset.
pub fn build_chart(dataset: &Dataset, settings: &ProjectSettings) -> Option<ChartBundle> {
    if dataset.is_empty() {
        return None;
    }

    let aggregated = TemporalAggregator::aggregate(dataset, settings.aggregation);
    let manifest = ColumnManifest::detect(&aggregated);
    let label_column = manifest.date_column?;

    let variables: Vec<String> = settings
        .selected_variables
        .iter()
        .filter(|v| aggregated.has_column(v))
        .cloned()
        .collect();
    if variables.is_empty() {
        return None;
    }

    let medians: BTreeMap<String, Segmentation> = if settings.show_median {
        variables
            .iter()
            .map(|v| (v.clone(), segment_series(&aggregated.series(v))))
            .collect()
    } else {
        BTreeMap::new()
    };

    debug!(
        points = aggregated.len(),
        variables = variables.len(),
        aggregation = %settings.aggregation,
        "building chart"
    );

    Some(assemble(&AssemblyInput {
        dataset: &aggregated,
        label_column: &label_column,
        variables: &variables,
        medians: &medians,
        goal: settings.goal_value,
        interventions: &settings.interventions,
        x_axis_title: &settings.x_axis_title,
        y_axis_title: &settings.y_axis_title,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
