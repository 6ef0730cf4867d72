//! Chartable-variable discovery, default selection and trend summaries.

use qi_core::formatting::format_percent;
use qi_core::models::{Cell, Dataset};
use serde::{Deserialize, Serialize};

/// Substrings (lower-case) of columns that are never offered as chart
/// variables: dates and the raw numerator/denominator counts.
pub const EXCLUDED_VARIABLE_PATTERNS: &[&str] = &[
    "date",
    "time",
    "timestamp",
    "period",
    "total_encounters",
    "encounters",
    "total",
    "denominator",
    "abx_prescribed",
    "antibiotics_prescribed",
    "antibiotics",
    "infections",
    "clabsi_count",
    "infection_count",
    "readmissions",
    "readmission_count",
    "line_days",
    "device_days",
    "patient_days",
    "discharges",
];

/// Points compared on each side when computing a trend.
const TREND_WINDOW: usize = 5;

/// Mean difference beyond which a trend is reported as up or down.
const TREND_THRESHOLD: f64 = 2.0;

/// `true` for names that look like rates or percentages.
pub fn is_rate_variable(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("rate") || lower.contains("percent") || lower.contains("pct")
}

/// Numeric columns (by first row) that are not excluded, in column order.
pub fn candidate_variables(dataset: &Dataset) -> Vec<String> {
    let Some(first) = dataset.rows().first() else {
        return Vec::new();
    };
    dataset
        .columns()
        .iter()
        .filter(|col| {
            let lower = col.to_lowercase();
            !EXCLUDED_VARIABLE_PATTERNS.iter().any(|p| lower.contains(p))
        })
        .filter(|col| first.get(*col).is_some_and(Cell::is_number))
        .cloned()
        .collect()
}

/// Resolve the variables to chart.
///
/// A non-empty `current` selection is kept, minus names that are not
/// candidates. Otherwise all rate-like candidates are chosen, falling back to
/// the first candidate.
pub fn default_selection(candidates: &[String], current: &[String]) -> Vec<String> {
    let kept: Vec<String> = current
        .iter()
        .filter(|v| candidates.contains(v))
        .cloned()
        .collect();
    if !kept.is_empty() {
        return kept;
    }

    let rates: Vec<String> = candidates
        .iter()
        .filter(|v| is_rate_variable(v))
        .cloned()
        .collect();
    if !rates.is_empty() {
        return rates;
    }

    candidates.first().cloned().into_iter().collect()
}

/// Add `variable` to (or remove it from) `selection`, keeping order.
pub fn toggle_variable(selection: &mut Vec<String>, variable: &str, checked: bool) {
    if checked {
        if !selection.iter().any(|v| v == variable) {
            selection.push(variable.to_string());
        }
    } else {
        selection.retain(|v| v != variable);
    }
}

// ── Trend ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Stable => "→",
        }
    }
}

/// Compare the mean of the last five rows with the mean of the five before.
///
/// Needs at least ten rows; non-numeric values are skipped.
pub fn trend(values: &[Option<f64>]) -> Trend {
    if values.len() < TREND_WINDOW * 2 {
        return Trend::Stable;
    }
    let n = values.len();
    let mean = |slice: &[Option<f64>]| -> Option<f64> {
        let valid: Vec<f64> = slice.iter().flatten().copied().collect();
        (!valid.is_empty()).then(|| valid.iter().sum::<f64>() / valid.len() as f64)
    };
    let (Some(recent), Some(previous)) = (
        mean(&values[n - TREND_WINDOW..]),
        mean(&values[n - 2 * TREND_WINDOW..n - TREND_WINDOW]),
    ) else {
        return Trend::Stable;
    };

    let diff = recent - previous;
    if diff > TREND_THRESHOLD {
        Trend::Up
    } else if diff < -TREND_THRESHOLD {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Headline numbers for a project card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSummary {
    pub variable: String,
    /// Last value, `x.x%` when numeric, `--` when absent.
    pub current_value: String,
    pub trend: Trend,
}

/// Summarise `variable` over `dataset`.
pub fn summarize(dataset: &Dataset, variable: &str) -> VariableSummary {
    let current_value = match dataset.rows().last().and_then(|r| r.get(variable)) {
        Some(Cell::Number(v)) => format_percent(*v, 1),
        Some(Cell::Text(s)) => s.clone(),
        _ => "--".to_string(),
    };
    VariableSummary {
        variable: variable.to_string(),
        current_value,
        trend: trend(&dataset.series(variable)),
    }
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

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // ── candidates / selection ────────────────────────────────────────────────

    #[test]
    fn test_candidates_exclude_counts_dates_and_text() {
        let ds = dataset(
            &["date", "ABX_PRESCRIBED", "TOTAL_ENCOUNTERS", "unit", "ABX_RATE", "LOS"],
            &[&[
                Cell::Text("2024-01-01".into()),
                Cell::Number(40.0),
                Cell::Number(200.0),
                Cell::Text("PICU".into()),
                Cell::Number(20.0),
                Cell::Number(3.2),
            ]],
        );
        assert_eq!(candidate_variables(&ds), strings(&["ABX_RATE", "LOS"]));
    }

    #[test]
    fn test_candidates_empty_dataset() {
        assert!(candidate_variables(&Dataset::empty()).is_empty());
    }

    #[test]
    fn test_default_selection_prefers_rates() {
        let candidates = strings(&["LOS", "ABX_RATE", "HAND_HYGIENE_PCT"]);
        assert_eq!(
            default_selection(&candidates, &[]),
            strings(&["ABX_RATE", "HAND_HYGIENE_PCT"])
        );
    }

    #[test]
    fn test_default_selection_falls_back_to_first() {
        let candidates = strings(&["LOS", "WAIT_MINUTES"]);
        assert_eq!(default_selection(&candidates, &[]), strings(&["LOS"]));
        assert!(default_selection(&[], &[]).is_empty());
    }

    #[test]
    fn test_default_selection_keeps_valid_current() {
        let candidates = strings(&["LOS", "ABX_RATE"]);
        assert_eq!(
            default_selection(&candidates, &strings(&["LOS", "GONE"])),
            strings(&["LOS"])
        );
    }

    #[test]
    fn test_toggle_variable() {
        let mut sel = strings(&["A"]);
        toggle_variable(&mut sel, "B", true);
        toggle_variable(&mut sel, "B", true);
        assert_eq!(sel, strings(&["A", "B"]));
        toggle_variable(&mut sel, "A", false);
        assert_eq!(sel, strings(&["B"]));
    }

    #[test]
    fn test_is_rate_variable() {
        assert!(is_rate_variable("abx_rate"));
        assert!(is_rate_variable("Percent_Compliant"));
        assert!(is_rate_variable("bundle_pct"));
        assert!(!is_rate_variable("LOS"));
    }

    // ── trend ─────────────────────────────────────────────────────────────────

    fn values(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().map(|&x| Some(x)).collect()
    }

    #[test]
    fn test_trend_up_down_stable() {
        let up = values(&[10.0, 10.0, 10.0, 10.0, 10.0, 13.0, 13.0, 13.0, 13.0, 13.0]);
        let down = values(&[13.0, 13.0, 13.0, 13.0, 13.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        let flat = values(&[10.0, 10.0, 10.0, 10.0, 10.0, 11.0, 11.0, 11.0, 11.0, 11.0]);
        assert_eq!(trend(&up), Trend::Up);
        assert_eq!(trend(&down), Trend::Down);
        assert_eq!(trend(&flat), Trend::Stable);
    }

    #[test]
    fn test_trend_needs_ten_points() {
        assert_eq!(trend(&values(&[1.0, 50.0, 100.0])), Trend::Stable);
    }

    #[test]
    fn test_summarize_formats_last_value() {
        let ds = dataset(
            &["date", "ABX_RATE"],
            &[
                &[Cell::Text("2024-01-01".into()), Cell::Number(18.0)],
                &[Cell::Text("2024-01-02".into()), Cell::Number(21.25)],
            ],
        );
        let summary = summarize(&ds, "ABX_RATE");
        assert_eq!(summary.current_value, "21.3%");
        assert_eq!(summary.trend, Trend::Stable);
        assert_eq!(summarize(&ds, "MISSING").current_value, "--");
    }
}
