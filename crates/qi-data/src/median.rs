//! Shift-aware median segmentation for run charts.
//!
//! A baseline median is taken over the first [`BASELINE_WINDOW`] points of a
//! segment. The rest of the series is then scanned for a run of
//! [`SHIFT_RUN_LENGTH`] consecutive points all above or all below that
//! median; such a run is a non-random shift, so the current segment closes
//! just before the run and a new baseline starts at the run's first point.
//!
//! Points exactly on the median and missing points neither extend nor break
//! a run.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of points used to establish each baseline median.
pub const BASELINE_WINDOW: usize = 10;

/// Consecutive points on one side of the median that signal a shift.
pub const SHIFT_RUN_LENGTH: usize = 6;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Tunables for [`segment_series`]. Defaults to the conventional 10 / 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationConfig {
    pub baseline_window: usize,
    pub shift_run_length: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            baseline_window: BASELINE_WINDOW,
            shift_run_length: SHIFT_RUN_LENGTH,
        }
    }
}

/// A contiguous, inclusive index range sharing one baseline median.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedianSegment {
    pub start_index: usize,
    pub end_index: usize,
    pub median: f64,
}

impl MedianSegment {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }
}

/// Result of segmenting one series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segmentation {
    pub segments: Vec<MedianSegment>,
    /// Index at which segmentation stopped because a baseline window held no
    /// valid values. Points from here on have no median overlay.
    pub halted_at: Option<usize>,
}

impl Segmentation {
    /// `true` when at least one shift was detected.
    pub fn has_shift(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn ended_early(&self) -> bool {
        self.halted_at.is_some()
    }
}

// ── Median ────────────────────────────────────────────────────────────────────

/// Median of the valid (present, non-NaN) values; `None` when there are none.
/// Even counts average the two middle values.
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut valid: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|x| !x.is_nan())
        .collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.total_cmp(b));
    let mid = valid.len() / 2;
    if valid.len() % 2 == 1 {
        Some(valid[mid])
    } else {
        Some((valid[mid - 1] + valid[mid]) / 2.0)
    }
}

// ── Shift detection ───────────────────────────────────────────────────────────

/// Offset (within `values`) of the first point of the first run of
/// `run_length` consecutive points strictly on one side of `median`.
pub fn detect_shift(values: &[Option<f64>], median: f64, run_length: usize) -> Option<usize> {
    let mut above = 0usize;
    let mut below = 0usize;
    let mut run_start = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = value.filter(|x| !x.is_nan()) else {
            continue;
        };
        if v > median {
            if above == 0 {
                run_start = i;
            }
            above += 1;
            below = 0;
            if above >= run_length {
                return Some(run_start);
            }
        } else if v < median {
            if below == 0 {
                run_start = i;
            }
            below += 1;
            above = 0;
            if below >= run_length {
                return Some(run_start);
            }
        }
    }
    None
}

// ── Segmentation ──────────────────────────────────────────────────────────────

/// Segment `values` with the default 10-point baseline / 6-point run rule.
pub fn segment_series(values: &[Option<f64>]) -> Segmentation {
    segment_series_with(values, SegmentationConfig::default())
}

/// Segment `values` into contiguous median segments.
///
/// Segments partition `[0, len - 1]` unless a baseline window contains no
/// valid values, in which case the loop stops and `halted_at` records where.
pub fn segment_series_with(values: &[Option<f64>], config: SegmentationConfig) -> Segmentation {
    let len = values.len();
    let window = config.baseline_window.max(1);
    let run_length = config.shift_run_length.max(1);
    let mut result = Segmentation::default();
    let mut cursor = 0usize;

    while cursor < len {
        let baseline_end = (cursor + window).min(len);
        let Some(baseline) = median(&values[cursor..baseline_end]) else {
            debug!(cursor, "baseline window has no valid values; stopping");
            result.halted_at = Some(cursor);
            break;
        };

        match detect_shift(&values[baseline_end..], baseline, run_length) {
            Some(offset) => {
                let shift_at = baseline_end + offset;
                result.segments.push(MedianSegment {
                    start_index: cursor,
                    end_index: shift_at - 1,
                    median: baseline,
                });
                debug!(shift_at, median = baseline, "shift detected");
                cursor = shift_at;
            }
            None => {
                result.segments.push(MedianSegment {
                    start_index: cursor,
                    end_index: len - 1,
                    median: baseline,
                });
                break;
            }
        }
    }

    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
