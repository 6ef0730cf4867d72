mod bootstrap;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use qi_core::models::{ColumnManifest, Project};
use qi_core::settings::Settings;
use qi_data::metrics::{DerivedMetricReport, MetricRuleSet};
use qi_data::series::ChartBundle;
use qi_data::variables::VariableSummary;
use qi_runtime::data_manager::DataManager;
use qi_runtime::orchestrator::RefreshOrchestrator;
use qi_runtime::project_store::ProjectStore;
use qi_runtime::session::DashboardSession;
use qi_runtime::store::KeyValueStore;
use serde::Serialize;

/// JSON document written for each render.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartReport<'a> {
    generated_at: DateTime<Utc>,
    project: Option<&'a str>,
    date_column: Option<String>,
    date_column_inferred: bool,
    derived_metrics: Vec<DerivedColumn<'a>>,
    summary: Option<VariableSummary>,
    chart: Option<ChartBundle>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DerivedColumn<'a> {
    output_name: &'a str,
    display_name: &'a str,
    source_columns: String,
}

impl<'a> From<&'a DerivedMetricReport> for DerivedColumn<'a> {
    fn from(report: &'a DerivedMetricReport) -> Self {
        Self {
            output_name: &report.output_name,
            display_name: &report.display_name,
            source_columns: report.source_columns(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("QI Dashboard v{} starting", env!("CARGO_PKG_VERSION"));

    let rules = match &settings.rules {
        Some(path) => MetricRuleSet::builtin_with_file(path)?,
        None => MetricRuleSet::builtin(),
    };

    let mut store = match &settings.project {
        Some(_) => Some(ProjectStore::open(KeyValueStore::open(&settings.store_path())?)?),
        None => None,
    };
    let mut project = match (&mut store, &settings.project) {
        (Some(store), Some(name)) => Some(open_project(store, name)?),
        _ => None,
    };

    let mut session = match &project {
        Some(p) => DashboardSession::from_project(p, rules.clone()),
        None => DashboardSession::new(rules.clone()),
    };

    let data_path = bootstrap::discover_data_path(&settings.data);
    match &data_path {
        Some(path) => {
            let mut manager = DataManager::new(path, rules.clone());
            let ingested = manager.force_reload().with_context(|| {
                format!(
                    "could not load {}: {}",
                    path.display(),
                    manager.last_error().unwrap_or("unknown error")
                )
            })?;
            session.replace_data(ingested);
        }
        None if session.dataset().is_some() => {
            tracing::warn!(
                "{} not found; using the project's saved data",
                settings.data.display()
            );
        }
        None => bail!("data file not found: {}", settings.data.display()),
    }

    apply_settings(&mut session, &settings)?;
    emit(&session, &settings, project.as_ref())?;

    if let Some(path) = &settings.export_csv {
        std::fs::write(path, session.export_csv()?)
            .with_context(|| format!("could not write {}", path.display()))?;
        tracing::info!("exported data to {}", path.display());
    }

    if let (Some(store), Some(p)) = (&mut store, &mut project) {
        session.write_into(p);
        *p = store.save(p)?;
        tracing::info!("saved project {:?}", p.name);
    }

    if settings.watch {
        let Some(path) = data_path else {
            bail!("--watch needs an existing data file");
        };
        tracing::info!(
            "watching {} every {}s",
            path.display(),
            settings.refresh_rate
        );

        let orchestrator =
            RefreshOrchestrator::new(u64::from(settings.refresh_rate), path, rules);
        let (mut rx, handle) = orchestrator.start();

        loop {
            tokio::select! {
                update = rx.recv() => {
                    let Some(update) = update else { break };
                    tracing::info!(at = %update.loaded_at, "data file changed; re-rendering");
                    session.replace_data(update.ingested);
                    emit(&session, &settings, project.as_ref())?;
                    if let (Some(store), Some(p)) = (&mut store, &mut project) {
                        session.write_into(p);
                        *p = store.save(p)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received; stopping refresh task");
                    break;
                }
            }
        }
        handle.abort();
    }

    Ok(())
}

/// Find a project by name, creating it when absent, and make it active.
fn open_project(store: &mut ProjectStore, name: &str) -> Result<Project> {
    if let Some(existing) = store.find_by_name(name.trim()).cloned() {
        store.set_active(&existing.id)?;
        return Ok(existing);
    }
    Ok(store.create(name, "")?)
}

/// Apply command-line chart options on top of the session's settings.
fn apply_settings(session: &mut DashboardSession, settings: &Settings) -> Result<()> {
    session.set_aggregation(settings.aggregation);
    session.set_show_median(!settings.hide_median);

    if !settings.variables.is_empty() {
        session.select_variables(&settings.variables)?;
    }
    if let Some(goal) = settings.goal {
        session.set_goal(goal)?;
    }
    if settings.x_axis_title.is_some() || settings.y_axis_title.is_some() {
        let current = session.settings();
        let x = settings
            .x_axis_title
            .clone()
            .unwrap_or_else(|| current.x_axis_title.clone());
        let y = settings
            .y_axis_title
            .clone()
            .unwrap_or_else(|| current.y_axis_title.clone());
        session.set_axis_titles(&x, &y);
    }
    Ok(())
}

/// Render the session and write the report to `--output` or stdout.
fn emit(session: &DashboardSession, settings: &Settings, project: Option<&Project>) -> Result<()> {
    let manifest = session.dataset().map(ColumnManifest::detect);
    let chart = session.render();
    if chart.is_none() {
        tracing::warn!("nothing to chart: no numeric variable selected");
    }
    for notice in chart.iter().flat_map(|c| &c.shift_notices) {
        tracing::info!(variable = %notice.variable, "{}", notice.message);
    }

    let report = ChartReport {
        generated_at: Utc::now(),
        project: project.map(|p| p.name.as_str()),
        date_column: manifest.as_ref().and_then(|m| m.date_column.clone()),
        date_column_inferred: manifest.as_ref().is_some_and(|m| m.date_column_inferred),
        derived_metrics: session.derived_metrics().iter().map(DerivedColumn::from).collect(),
        summary: session.summary(),
        chart,
    };
    let json = serde_json::to_string_pretty(&report)?;

    match &settings.output {
        Some(path) => write_output(path, &json),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn write_output(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json).with_context(|| format!("could not write {}", path.display()))?;
    tracing::debug!("wrote chart report to {}", path.display());
    Ok(())
}
