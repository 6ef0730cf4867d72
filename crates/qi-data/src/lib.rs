//! Run-chart computation layer for the QI dashboard.
//!
//! Turns CSV/JSON text into datasets, derives rate columns, buckets rows by
//! period, segments each series into shift-aware medians and assembles the
//! label/series bundle handed to a chart renderer.

pub mod aggregator;
pub mod analysis;
pub mod export;
pub mod median;
pub mod metrics;
pub mod reader;
pub mod series;
pub mod variables;

pub use qi_core as core;
