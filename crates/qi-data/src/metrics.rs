//! Derived rate columns synthesized from numerator/denominator pairs.
//!
//! Column classification is driven entirely by a [`MetricRuleSet`], a table
//! of name patterns that can be extended from a JSON file so that new
//! institutional metrics need no code change.

use std::path::Path;

use qi_core::error::{QiError, Result};
use qi_core::formatting::round2;
use qi_core::models::{Cell, Dataset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ── DerivedMetricRule ─────────────────────────────────────────────────────────

/// One numerator/denominator → rate rule.
///
/// Patterns are matched as case-insensitive substrings of column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetricRule {
    pub output_name: String,
    #[serde(default)]
    pub display_name: String,
    pub numerator_patterns: Vec<String>,
    pub denominator_patterns: Vec<String>,
}

impl DerivedMetricRule {
    pub fn new(
        output_name: &str,
        display_name: &str,
        numerator_patterns: &[&str],
        denominator_patterns: &[&str],
    ) -> Self {
        Self {
            output_name: output_name.to_string(),
            display_name: display_name.to_string(),
            numerator_patterns: numerator_patterns.iter().map(|s| s.to_string()).collect(),
            denominator_patterns: denominator_patterns.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// First column in `columns` whose upper-cased name contains any pattern.
    fn find_column<'a>(columns: &'a [String], patterns: &[String]) -> Option<&'a String> {
        columns.iter().find(|col| {
            let upper = col.to_uppercase();
            patterns.iter().any(|p| upper.contains(&p.to_uppercase()))
        })
    }

    /// Resolve the (numerator, denominator) columns this rule would use, or
    /// `None` when the rule does not apply to `columns`.
    pub fn resolve<'a>(&self, columns: &'a [String]) -> Option<(&'a String, &'a String)> {
        if columns.iter().any(|c| c == &self.output_name) {
            return None;
        }
        let numerator = Self::find_column(columns, &self.numerator_patterns)?;
        let denominator = Self::find_column(columns, &self.denominator_patterns)?;
        Some((numerator, denominator))
    }
}

// ── MetricRuleSet ─────────────────────────────────────────────────────────────

/// Ordered rule table; earlier rules take priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRuleSet {
    rules: Vec<DerivedMetricRule>,
}

impl Default for MetricRuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MetricRuleSet {
    /// Antibiotic, infection and readmission rates.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                DerivedMetricRule::new(
                    "ABX_RATE",
                    "Antibiotic Rate (%)",
                    &["ABX_PRESCRIBED", "ANTIBIOTICS_PRESCRIBED", "ANTIBIOTICS", "ABX"],
                    &["TOTAL_ENCOUNTERS", "ENCOUNTERS", "TOTAL", "DENOMINATOR"],
                ),
                DerivedMetricRule::new(
                    "INFECTION_RATE",
                    "Infection Rate",
                    &["INFECTIONS", "CLABSI_COUNT", "INFECTION_COUNT"],
                    &["LINE_DAYS", "DEVICE_DAYS", "PATIENT_DAYS"],
                ),
                DerivedMetricRule::new(
                    "READMISSION_RATE",
                    "Readmission Rate (%)",
                    &["READMISSIONS", "READMISSION_COUNT"],
                    &["DISCHARGES", "TOTAL_DISCHARGES"],
                ),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_rules(rules: Vec<DerivedMetricRule>) -> Self {
        Self { rules }
    }

    /// Parse a JSON array of rules.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Built-in rules followed by the rules in the JSON file at `path`.
    pub fn builtin_with_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| QiError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let extra = Self::from_json_str(&content)
            .map_err(|e| QiError::Config(format!("{}: {}", path.display(), e)))?;
        let mut set = Self::builtin();
        set.extend(extra);
        Ok(set)
    }

    /// Append a rule at the lowest priority.
    pub fn push(&mut self, rule: DerivedMetricRule) {
        self.rules.push(rule);
    }

    pub fn extend(&mut self, other: MetricRuleSet) {
        self.rules.extend(other.rules);
    }

    pub fn rules(&self) -> &[DerivedMetricRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ── Derivation ────────────────────────────────────────────────────────────────

/// A rule that fired, for display next to the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetricReport {
    pub output_name: String,
    pub display_name: String,
    pub numerator_column: String,
    pub denominator_column: String,
}

impl DerivedMetricReport {
    /// e.g. `"ABX_PRESCRIBED / TOTAL_ENCOUNTERS"`.
    pub fn source_columns(&self) -> String {
        format!("{} / {}", self.numerator_column, self.denominator_column)
    }
}

/// `round2(numerator / denominator * 100)`, or `0` when the denominator is
/// not positive.
pub fn rate(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        round2((numerator / denominator) * 100.0)
    } else {
        0.0
    }
}

/// Apply every rule of `rules` to `dataset`, in order.
///
/// Rules are matched against the input's columns only, so a column added by
/// one rule never feeds another. Missing and non-numeric source cells count
/// as `0`.
pub fn derive_metrics(
    dataset: &Dataset,
    rules: &MetricRuleSet,
) -> (Dataset, Vec<DerivedMetricReport>) {
    let mut out = dataset.clone();
    let mut reports = Vec::new();

    if dataset.is_empty() {
        return (out, reports);
    }

    let columns = dataset.columns();
    for rule in rules.rules() {
        let Some((numerator, denominator)) = rule.resolve(columns) else {
            debug!(rule = %rule.output_name, "derived metric rule did not match");
            continue;
        };

        let values: Vec<Cell> = dataset
            .rows()
            .iter()
            .map(|row| {
                let n = row.get(numerator).map_or(0.0, Cell::as_number_or_zero);
                let d = row.get(denominator).map_or(0.0, Cell::as_number_or_zero);
                Cell::Number(rate(n, d))
            })
            .collect();

        if out.push_column(&rule.output_name, values) {
            info!(
                "Auto-calculating {} from {} / {}",
                rule.output_name, numerator, denominator
            );
            reports.push(DerivedMetricReport {
                output_name: rule.output_name.clone(),
                display_name: rule.display_name.clone(),
                numerator_column: numerator.clone(),
                denominator_column: denominator.clone(),
            });
        }
    }

    (out, reports)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use qi_core::models::Row;

    fn dataset(columns: &[&str], rows: &[&[Cell]]) -> Dataset {
        let cols: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows: Vec<Row> = rows
            .iter()
            .map(|cells| cols.iter().cloned().zip(cells.iter().cloned()).collect())
            .collect();
        Dataset::new(cols, rows)
    }

    fn n(v: f64) -> Cell {
        Cell::Number(v)
    }

    // ── rate ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_rate_rounds_to_two_decimals() {
        assert_eq!(rate(40.0, 200.0), 20.0);
        assert_eq!(rate(1.0, 3.0), 33.33);
        assert_eq!(rate(5.0, 0.0), 0.0);
        assert_eq!(rate(5.0, -2.0), 0.0);
    }

    // ── derive_metrics ────────────────────────────────────────────────────────

    #[test]
    fn test_abx_rate_derived_once() {
        let ds = dataset(
            &["date", "ABX_PRESCRIBED", "TOTAL_ENCOUNTERS"],
            &[&[Cell::Text("2024-01-01".into()), n(40.0), n(200.0)]],
        );
        let (out, reports) = derive_metrics(&ds, &MetricRuleSet::builtin());

        assert_eq!(out.cell(0, "ABX_RATE"), &n(20.0));
        assert_eq!(out.columns().last().map(String::as_str), Some("ABX_RATE"));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].output_name, "ABX_RATE");
        assert_eq!(reports[0].source_columns(), "ABX_PRESCRIBED / TOTAL_ENCOUNTERS");

        // Running again over the derived output adds nothing.
        let (again, reports) = derive_metrics(&out, &MetricRuleSet::builtin());
        assert!(reports.is_empty());
        assert_eq!(again, out);
    }

    #[test]
    fn test_existing_rate_column_is_kept() {
        let ds = dataset(
            &["ABX_PRESCRIBED", "TOTAL_ENCOUNTERS", "ABX_RATE"],
            &[&[n(40.0), n(200.0), n(99.0)]],
        );
        let (out, reports) = derive_metrics(&ds, &MetricRuleSet::builtin());
        assert!(reports.is_empty());
        assert_eq!(out.cell(0, "ABX_RATE"), &n(99.0));
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let ds = dataset(
            &["clabsi_count", "Line_Days"],
            &[&[n(2.0), n(400.0)]],
        );
        let (out, reports) = derive_metrics(&ds, &MetricRuleSet::builtin());
        assert_eq!(reports[0].output_name, "INFECTION_RATE");
        assert_eq!(out.cell(0, "INFECTION_RATE"), &n(0.5));
    }

    #[test]
    fn test_missing_and_text_cells_coerce_to_zero() {
        let ds = dataset(
            &["READMISSIONS", "DISCHARGES"],
            &[
                &[Cell::Empty, n(50.0)],
                &[n(3.0), Cell::Text("pending".into())],
            ],
        );
        let (out, _) = derive_metrics(&ds, &MetricRuleSet::builtin());
        assert_eq!(out.cell(0, "READMISSION_RATE"), &n(0.0));
        assert_eq!(out.cell(1, "READMISSION_RATE"), &n(0.0));
    }

    #[test]
    fn test_multiple_rules_fire_in_priority_order() {
        let ds = dataset(
            &["ABX", "ENCOUNTERS", "READMISSION_COUNT", "TOTAL_DISCHARGES"],
            &[&[n(10.0), n(40.0), n(1.0), n(8.0)]],
        );
        let (out, reports) = derive_metrics(&ds, &MetricRuleSet::builtin());
        let names: Vec<&str> = reports.iter().map(|r| r.output_name.as_str()).collect();
        assert_eq!(names, vec!["ABX_RATE", "READMISSION_RATE"]);
        assert_eq!(out.cell(0, "ABX_RATE"), &n(25.0));
        assert_eq!(out.cell(0, "READMISSION_RATE"), &n(12.5));
    }

    #[test]
    fn test_requires_both_sides() {
        let ds = dataset(&["INFECTIONS"], &[&[n(3.0)]]);
        let (out, reports) = derive_metrics(&ds, &MetricRuleSet::builtin());
        assert!(reports.is_empty());
        assert!(!out.has_column("INFECTION_RATE"));
    }

    #[test]
    fn test_empty_dataset_is_untouched() {
        let (out, reports) = derive_metrics(&Dataset::empty(), &MetricRuleSet::builtin());
        assert!(out.is_empty());
        assert!(reports.is_empty());
    }

    // ── MetricRuleSet ─────────────────────────────────────────────────────────

    #[test]
    fn test_custom_rule_from_json() {
        let json = r#"[{
            "outputName": "FALL_RATE",
            "displayName": "Falls per 100 patient days",
            "numeratorPatterns": ["falls"],
            "denominatorPatterns": ["census"]
        }]"#;
        let mut rules = MetricRuleSet::builtin();
        rules.extend(MetricRuleSet::from_json_str(json).unwrap());
        assert_eq!(rules.len(), 4);

        let ds = dataset(&["FALLS", "CENSUS"], &[&[n(1.0), n(4.0)]]);
        let (out, reports) = derive_metrics(&ds, &rules);
        assert_eq!(reports[0].display_name, "Falls per 100 patient days");
        assert_eq!(out.cell(0, "FALL_RATE"), &n(25.0));
    }

    #[test]
    fn test_builtin_with_file() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"outputName":"X","numeratorPatterns":["A"],"denominatorPatterns":["B"]}]"#,
        )
        .unwrap();
        let rules = MetricRuleSet::builtin_with_file(&path).unwrap();
        assert_eq!(rules.rules().last().unwrap().output_name, "X");
    }

    #[test]
    fn test_builtin_with_invalid_file_is_config_error() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join("rules.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = MetricRuleSet::builtin_with_file(&path).unwrap_err();
        assert!(matches!(err, QiError::Config(_)));
    }
}
