//! Assembly of the renderable run-chart bundle.
//!
//! The bundle is the contract with the external chart renderer: category
//! labels, an ordered list of named series with style hints, point
//! annotations for interventions, axis hints and display-only notices.

use std::collections::BTreeMap;

use qi_core::formatting::format_number;
use qi_core::models::{Dataset, Intervention};
use serde::{Deserialize, Serialize};

use crate::median::{Segmentation, SHIFT_RUN_LENGTH};
use crate::variables::is_rate_variable;

/// Colours cycled across selected variables.
pub const PALETTE: [&str; 6] = [
    "#567159", "#81b0c4", "#e07a5f", "#d4a574", "#9d8cb8", "#748c76",
];
pub const MEDIAN_COLOR: &str = "#c0392b";
pub const GOAL_COLOR: &str = "#27ae60";
pub const INTERVENTION_COLOR: &str = "#e07a5f";

// ── Bundle types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Data,
    Median,
    Goal,
}

/// Rendering hints for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleHint {
    pub kind: SeriesKind,
    pub color: String,
    /// Dash pattern; empty for a solid line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dash: Vec<u32>,
    pub point_radius: u32,
    /// Always `false` for median pieces so separate segments stay separate.
    pub span_gaps: bool,
}

/// One line on the chart. `name` is `None` for median pieces after the first
/// so the legend shows each variable's median once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub name: Option<String>,
    /// Variable this series belongs to; `None` for the goal line.
    pub variable: Option<String>,
    pub values: Vec<Option<f64>>,
    pub style: StyleHint,
}

/// A vertical marker at an intervention date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub date: String,
    pub label: String,
    pub description: String,
    pub color: String,
}

impl From<&Intervention> for Annotation {
    fn from(i: &Intervention) -> Self {
        Self {
            date: i.date.clone(),
            label: i.label.clone(),
            description: i.description.clone(),
            color: INTERVENTION_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisHints {
    pub x_title: String,
    pub y_title: String,
    /// `100` for rate charts.
    pub y_suggested_max: Option<f64>,
    /// Render y ticks with a `%` suffix.
    pub percent_ticks: bool,
}

/// "N median segments detected" message for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftNotice {
    pub variable: String,
    pub segment_count: usize,
    pub message: String,
}

impl ShiftNotice {
    pub fn new(variable: &str, segment_count: usize) -> Self {
        Self {
            variable: variable.to_string(),
            segment_count,
            message: format!(
                "{} median segments detected (shift after {}+ consecutive points above/below)",
                segment_count, SHIFT_RUN_LENGTH
            ),
        }
    }
}

/// A variable whose median overlay stops before the end of the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncoveredTail {
    pub variable: String,
    pub from_index: usize,
}

/// Everything a chart renderer needs to draw one run chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartBundle {
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
    pub annotations: Vec<Annotation>,
    pub axes: AxisHints,
    pub shift_notices: Vec<ShiftNotice>,
    pub uncovered_tails: Vec<UncoveredTail>,
}

impl ChartBundle {
    /// Series of a given kind, in order.
    pub fn series_of(&self, kind: SeriesKind) -> impl Iterator<Item = &ChartSeries> {
        self.series.iter().filter(move |s| s.style.kind == kind)
    }
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// Inputs to [`assemble`].
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub dataset: &'a Dataset,
    /// Column whose cells become the category labels.
    pub label_column: &'a str,
    pub variables: &'a [String],
    /// Segmentation per variable; variables without an entry get no median
    /// overlay.
    pub medians: &'a BTreeMap<String, Segmentation>,
    pub goal: Option<f64>,
    pub interventions: &'a [Intervention],
    pub x_axis_title: &'a str,
    pub y_axis_title: &'a str,
}

/// Build the chart bundle.
pub fn assemble(input: &AssemblyInput<'_>) -> ChartBundle {
    let len = input.dataset.len();
    let labels = input.dataset.labels(input.label_column);
    let mut series = Vec::new();
    let mut shift_notices = Vec::new();
    let mut uncovered_tails = Vec::new();

    for (index, variable) in input.variables.iter().enumerate() {
        let color = PALETTE[index % PALETTE.len()];
        series.push(ChartSeries {
            name: Some(variable.clone()),
            variable: Some(variable.clone()),
            values: input.dataset.series(variable),
            style: StyleHint {
                kind: SeriesKind::Data,
                color: color.to_string(),
                dash: Vec::new(),
                point_radius: 5,
                span_gaps: false,
            },
        });

        let Some(segmentation) = input.medians.get(variable) else {
            continue;
        };

        for (seg_index, segment) in segmentation.segments.iter().enumerate() {
            let values = (0..len)
                .map(|i| segment.contains(i).then_some(segment.median))
                .collect();
            series.push(ChartSeries {
                name: (seg_index == 0).then(|| format!("{} Median", variable)),
                variable: Some(variable.clone()),
                values,
                style: StyleHint {
                    kind: SeriesKind::Median,
                    color: MEDIAN_COLOR.to_string(),
                    dash: Vec::new(),
                    point_radius: 0,
                    span_gaps: false,
                },
            });
        }

        if segmentation.has_shift() {
            shift_notices.push(ShiftNotice::new(variable, segmentation.segments.len()));
        }
        if let Some(from_index) = segmentation.halted_at {
            uncovered_tails.push(UncoveredTail {
                variable: variable.clone(),
                from_index,
            });
        }
    }

    if let Some(goal) = input.goal {
        series.push(ChartSeries {
            name: Some(format!("Goal ({}%)", format_number(goal))),
            variable: None,
            values: vec![Some(goal); len],
            style: StyleHint {
                kind: SeriesKind::Goal,
                color: GOAL_COLOR.to_string(),
                dash: vec![8, 4],
                point_radius: 0,
                span_gaps: false,
            },
        });
    }

    let rate_chart = input.variables.iter().any(|v| is_rate_variable(v));
    let y_title = if !input.y_axis_title.trim().is_empty() {
        input.y_axis_title.to_string()
    } else if rate_chart {
        "Rate (%)".to_string()
    } else {
        "Value".to_string()
    };
    let x_title = if input.x_axis_title.trim().is_empty() {
        "Date".to_string()
    } else {
        input.x_axis_title.to_string()
    };

    ChartBundle {
        labels,
        series,
        annotations: input.interventions.iter().map(Annotation::from).collect(),
        axes: AxisHints {
            x_title,
            y_title,
            y_suggested_max: rate_chart.then_some(100.0),
            percent_ticks: rate_chart,
        },
        shift_notices,
        uncovered_tails,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
