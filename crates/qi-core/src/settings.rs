use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, Parser};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::AggregationPeriod;

/// Data file polled when none is given on the command line.
pub const DEFAULT_DATA_FILE: &str = "data/qi-data.csv";

/// Name of the per-user state directory under `$HOME`.
pub const STATE_DIR_NAME: &str = ".qi-dashboard";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Quality-improvement run charts with shift-aware median lines
#[derive(Parser, Debug, Clone)]
#[command(
    name = "qi-dashboard",
    about = "Quality-improvement run charts with shift-aware median lines",
    version
)]
pub struct Settings {
    /// CSV or JSON data file
    #[arg(long, default_value = DEFAULT_DATA_FILE)]
    pub data: PathBuf,

    /// Aggregation period applied before charting
    #[arg(long, value_enum, default_value_t = AggregationPeriod::Daily)]
    pub aggregation: AggregationPeriod,

    /// Variables to chart (comma separated); auto-selected when omitted
    #[arg(long, value_delimiter = ',')]
    pub variables: Vec<String>,

    /// Goal line value
    #[arg(long, allow_hyphen_values = true)]
    pub goal: Option<f64>,

    /// Do not compute the median overlay
    #[arg(long)]
    pub hide_median: bool,

    /// X-axis title
    #[arg(long)]
    pub x_axis_title: Option<String>,

    /// Y-axis title
    #[arg(long)]
    pub y_axis_title: Option<String>,

    /// JSON file with additional derived-metric rules
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Project to load settings from and save results to (created if absent)
    #[arg(long)]
    pub project: Option<String>,

    /// Project store file (defaults to ~/.qi-dashboard/store.json)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Write the (derived, un-aggregated) dataset as CSV to this path
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Write the chart bundle JSON here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Keep running and re-emit the chart whenever the data file changes
    #[arg(long)]
    pub watch: bool,

    /// Poll interval in seconds for --watch (1-300)
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(1..=300))]
    pub refresh_rate: u32,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging (same as `--log-level DEBUG`)
    #[arg(long)]
    pub debug: bool,

    /// Forget remembered options and start from the defaults
    #[arg(long)]
    pub clear: bool,
}

// ── Remembered options ─────────────────────────────────────────────────────────

/// Options carried over between runs, stored in
/// `~/.qi-dashboard/last_used.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastUsedParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
}

impl LastUsedParams {
    /// `last_used.json` inside the state directory under `home`.
    pub fn path_under(home: &Path) -> PathBuf {
        home.join(STATE_DIR_NAME).join("last_used.json")
    }

    /// Read remembered options; a missing or unreadable file yields none.
    pub fn read(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "ignoring unreadable {}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist atomically: write a sibling temp file, then rename over.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let staged = path.with_extension("json.tmp");
        std::fs::write(&staged, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&staged, path)?;
        Ok(())
    }

    /// Remove the file at `path`; absent files are fine.
    pub fn forget(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        Self {
            data: Some(s.data.clone()),
            aggregation: Some(s.aggregation),
            refresh_rate: Some(s.refresh_rate),
            rules: s.rules.clone(),
        }
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments, fill unspecified options from the last
    /// run and remember the result for the next one.
    pub fn load_with_last_used() -> Self {
        let path = LastUsedParams::path_under(&home_dir());
        Self::resolve(std::env::args_os(), &path)
    }

    /// [`Settings::load_with_last_used`] with explicit arguments and file.
    pub fn resolve<I, T>(args: I, remembered_at: &Path) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let matches = Self::command().get_matches_from(&args);
        let mut settings = Self::parse_from(&args);

        if settings.clear {
            if let Err(e) = LastUsedParams::forget(remembered_at) {
                tracing::warn!(error = %e, "could not clear remembered options");
            }
        } else {
            settings.fill_from(LastUsedParams::read(remembered_at), &matches);
            if let Err(e) = LastUsedParams::from(&settings).write(remembered_at) {
                tracing::warn!(error = %e, "could not remember options");
            }
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Take remembered values for options not typed on the command line.
    fn fill_from(&mut self, last: LastUsedParams, matches: &ArgMatches) {
        let typed = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);

        if let (false, Some(data)) = (typed("data"), last.data) {
            self.data = data;
        }
        if let (false, Some(period)) = (typed("aggregation"), last.aggregation) {
            self.aggregation = period;
        }
        if let (false, Some(secs)) = (typed("refresh_rate"), last.refresh_rate) {
            self.refresh_rate = secs;
        }
        if self.rules.is_none() {
            self.rules = last.rules;
        }
    }

    /// Directory holding persisted state (`~/.qi-dashboard`).
    pub fn state_dir() -> PathBuf {
        home_dir().join(STATE_DIR_NAME)
    }

    /// Project store path: `--store` or `~/.qi-dashboard/store.json`.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("store.json"))
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
