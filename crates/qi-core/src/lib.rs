//! Shared building blocks for the QI run-chart dashboard.
//!
//! Holds the error type, the tabular data model, CLI settings with
//! last-used persistence, calendar-date helpers and number formatting.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{QiError, Result};
