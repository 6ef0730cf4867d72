//! Modification-time watcher for the dashboard's data file.
//!
//! [`DataManager::check_for_updates`] re-ingests the file only when its
//! modification time differs from the last one seen. Every failure is
//! swallowed into [`DataManager::last_error`] and reported as "no update".

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use qi_core::error::QiError;
use qi_data::analysis::{ingest_file, Ingested};
use qi_data::metrics::MetricRuleSet;

/// Default poll interval in seconds.
pub const DEFAULT_REFRESH_SECS: u64 = 30;

pub struct DataManager {
    path: PathBuf,
    rules: MetricRuleSet,
    /// Modification time of the last successfully ingested version.
    last_modified: Option<SystemTime>,
    last_error: Option<String>,
}

impl DataManager {
    pub fn new(path: impl Into<PathBuf>, rules: MetricRuleSet) -> Self {
        Self {
            path: path.into(),
            rules,
            last_modified: None,
            last_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-ingest when the file changed since the last successful load.
    ///
    /// Returns `None` when the file is unchanged, missing or fails to parse.
    pub fn check_for_updates(&mut self) -> Option<Ingested> {
        let modified = match self.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::debug!(error = %e, "data file not readable; no update");
                self.last_error = Some(e.to_string());
                return None;
            }
        };

        if self.last_modified == Some(modified) {
            tracing::debug!("data file unchanged");
            return None;
        }

        let ingested = self.load()?;
        self.last_modified = Some(modified);
        Some(ingested)
    }

    /// Ingest regardless of the modification time.
    pub fn force_reload(&mut self) -> Option<Ingested> {
        let ingested = self.load()?;
        self.last_modified = self.modified().ok();
        Some(ingested)
    }

    /// Description of the most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn modified(&self) -> Result<SystemTime, QiError> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| QiError::FileRead {
                path: self.path.clone(),
                source,
            })
    }

    fn load(&mut self) -> Option<Ingested> {
        match ingest_file(&self.path, &self.rules) {
            Ok(ingested) => {
                tracing::info!(
                    rows = ingested.dataset.len(),
                    derived = ingested.derived.len(),
                    "loaded {}",
                    self.path.display()
                );
                self.last_error = None;
                Some(ingested)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load data file; keeping previous data");
                self.last_error = Some(e.to_string());
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
