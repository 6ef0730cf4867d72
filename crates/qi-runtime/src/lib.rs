//! Runtime layer for the QI dashboard.
//!
//! Persists projects, watches the data file for changes and owns the
//! per-session dashboard state that ties the computation layer together.

pub mod data_manager;
pub mod orchestrator;
pub mod project_store;
pub mod session;
pub mod store;

pub use qi_core as core;
pub use qi_data as data;
