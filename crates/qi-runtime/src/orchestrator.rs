//! Async auto-refresh loop.
//!
//! Polls a [`DataManager`] on an interval inside a tokio task and forwards
//! each fresh [`Ingested`] dataset through an `mpsc` channel.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qi_data::analysis::Ingested;
use qi_data::metrics::MetricRuleSet;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::data_manager::DataManager;

/// A freshly ingested version of the data file.
#[derive(Debug, Clone)]
pub struct DataUpdate {
    pub ingested: Ingested,
    pub loaded_at: DateTime<Utc>,
}

pub struct RefreshOrchestrator {
    interval: Duration,
    path: PathBuf,
    rules: MetricRuleSet,
}

impl RefreshOrchestrator {
    pub fn new(interval_secs: u64, path: impl Into<PathBuf>, rules: MetricRuleSet) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            path: path.into(),
            rules,
        }
    }

    /// Spawn the refresh loop.
    ///
    /// The first poll happens immediately. The loop ends when the receiver
    /// is dropped or the handle is aborted.
    pub fn start(self) -> (mpsc::Receiver<DataUpdate>, RefreshHandle) {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(async move {
            self.refresh_loop(tx).await;
        });
        (rx, RefreshHandle { handle })
    }

    async fn refresh_loop(self, tx: mpsc::Sender<DataUpdate>) {
        let mut manager = DataManager::new(self.path, self.rules);
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("refresh channel closed; exiting loop");
                break;
            }

            let Some(ingested) = manager.check_for_updates() else {
                continue;
            };
            let update = DataUpdate {
                ingested,
                loaded_at: Utc::now(),
            };
            if tx.send(update).await.is_err() {
                tracing::debug!("refresh receiver dropped; exiting loop");
                break;
            }
        }
    }
}

/// Handle to the background refresh task.
pub struct RefreshHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl RefreshHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
