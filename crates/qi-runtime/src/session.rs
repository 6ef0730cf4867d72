//! Per-project dashboard state.
//!
//! [`DashboardSession`] is the one place that holds the loaded dataset and
//! chart settings. Every mutating operation validates first and leaves the
//! session untouched when it returns an error.

use qi_core::error::{QiError, Result};
use qi_core::models::{
    AggregationPeriod, Dataset, Intervention, Project, ProjectSettings, DEFAULT_X_AXIS_TITLE,
    DEFAULT_Y_AXIS_TITLE,
};
use qi_data::analysis::{build_chart, ingest, Ingested};
use qi_data::export::to_csv;
use qi_data::metrics::{DerivedMetricReport, MetricRuleSet};
use qi_data::series::ChartBundle;
use qi_data::variables::{self, summarize, VariableSummary};
use tracing::{debug, info};

pub struct DashboardSession {
    rules: MetricRuleSet,
    data: Option<Dataset>,
    derived: Vec<DerivedMetricReport>,
    candidates: Vec<String>,
    settings: ProjectSettings,
}

impl DashboardSession {
    pub fn new(rules: MetricRuleSet) -> Self {
        Self {
            rules,
            data: None,
            derived: Vec::new(),
            candidates: Vec::new(),
            settings: ProjectSettings::default(),
        }
    }

    /// Restore a session from a saved project.
    pub fn from_project(project: &Project, rules: MetricRuleSet) -> Self {
        let mut session = Self::new(rules);
        session.settings = project.settings.clone();
        if let Some(data) = &project.data {
            session.candidates = variables::candidate_variables(data);
            session.data = Some(data.clone());
        }
        session
    }

    /// Copy the dataset and settings into `project` for saving.
    pub fn write_into(&self, project: &mut Project) {
        project.data = self.data.clone();
        project.settings = self.settings.clone();
    }

    // ── Data ──────────────────────────────────────────────────────────────────

    /// Parse and adopt new file content.
    ///
    /// Parsing, derivation and validation all happen before any state
    /// changes, so a failed load keeps the previous dataset.
    pub fn load_content(&mut self, content: &str, filename: &str) -> Result<&[DerivedMetricReport]> {
        let ingested = ingest(content, filename, &self.rules)?;
        self.replace_data(ingested);
        Ok(self.derived.as_slice())
    }

    /// Adopt an already ingested dataset (e.g. from the refresh loop).
    pub fn replace_data(&mut self, ingested: Ingested) {
        self.candidates = variables::candidate_variables(&ingested.dataset);
        self.settings.selected_variables =
            variables::default_selection(&self.candidates, &self.settings.selected_variables);
        info!(
            rows = ingested.dataset.len(),
            candidates = self.candidates.len(),
            selected = ?self.settings.selected_variables,
            "dataset loaded"
        );
        self.data = Some(ingested.dataset);
        self.derived = ingested.derived;
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.data.as_ref()
    }

    /// Derived columns added by the most recent load.
    pub fn derived_metrics(&self) -> &[DerivedMetricReport] {
        &self.derived
    }

    /// Variables that can be charted.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    /// Check or uncheck a chart variable. Only candidates can be checked.
    pub fn toggle_variable(&mut self, variable: &str, checked: bool) -> Result<()> {
        if checked && !self.candidates.iter().any(|c| c == variable) {
            return Err(QiError::InvalidInput(format!(
                "{variable} is not a chartable variable"
            )));
        }
        variables::toggle_variable(&mut self.settings.selected_variables, variable, checked);
        Ok(())
    }

    /// Replace the selection wholesale. Every name must be a candidate.
    pub fn select_variables(&mut self, selection: &[String]) -> Result<()> {
        if let Some(unknown) = selection.iter().find(|v| !self.candidates.contains(v)) {
            return Err(QiError::InvalidInput(format!(
                "{unknown} is not a chartable variable"
            )));
        }
        self.settings.selected_variables = selection.to_vec();
        Ok(())
    }

    pub fn set_goal(&mut self, goal: f64) -> Result<()> {
        if !goal.is_finite() {
            return Err(QiError::InvalidInput("goal must be a finite number".to_string()));
        }
        self.settings.goal_value = Some(goal);
        Ok(())
    }

    pub fn clear_goal(&mut self) {
        self.settings.goal_value = None;
    }

    /// Add an intervention marker. Date and label are required.
    pub fn add_intervention(
        &mut self,
        date: &str,
        label: &str,
        description: &str,
    ) -> Result<&Intervention> {
        let (date, label) = (date.trim(), label.trim());
        if date.is_empty() || label.is_empty() {
            return Err(QiError::InvalidInput(
                "intervention date and label are required".to_string(),
            ));
        }
        self.settings
            .interventions
            .push(Intervention::new(date, label, description.trim()));
        let added = &self.settings.interventions[self.settings.interventions.len() - 1];
        debug!(id = %added.id, "added intervention");
        Ok(added)
    }

    /// Remove the intervention with `id`; `false` when there was none.
    pub fn remove_intervention(&mut self, id: &str) -> bool {
        let before = self.settings.interventions.len();
        self.settings.interventions.retain(|i| i.id != id);
        self.settings.interventions.len() != before
    }

    pub fn set_aggregation(&mut self, period: AggregationPeriod) {
        self.settings.aggregation = period;
    }

    pub fn set_show_median(&mut self, show: bool) {
        self.settings.show_median = show;
    }

    /// Set axis titles; blank titles fall back to the defaults.
    pub fn set_axis_titles(&mut self, x_title: &str, y_title: &str) {
        self.settings.x_axis_title = non_blank_or(x_title, DEFAULT_X_AXIS_TITLE);
        self.settings.y_axis_title = non_blank_or(y_title, DEFAULT_Y_AXIS_TITLE);
    }

    /// Clear selections, goal and interventions; restore median and daily
    /// aggregation. The dataset is kept and a default selection re-applied.
    pub fn reset(&mut self) {
        self.settings.selected_variables.clear();
        self.settings.interventions.clear();
        self.settings.goal_value = None;
        self.settings.show_median = true;
        self.settings.aggregation = AggregationPeriod::Daily;
        if self.data.is_some() {
            self.settings.selected_variables =
                variables::default_selection(&self.candidates, &[]);
        }
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// Chart bundle for the current state, `None` when there is nothing to
    /// draw.
    pub fn render(&self) -> Option<ChartBundle> {
        build_chart(self.data.as_ref()?, &self.settings)
    }

    /// The loaded dataset (derived columns included) as CSV.
    pub fn export_csv(&self) -> Result<String> {
        self.data
            .as_ref()
            .map(to_csv)
            .ok_or_else(|| QiError::InvalidInput("no data to export".to_string()))
    }

    /// Headline value and trend of the first selected variable.
    pub fn summary(&self) -> Option<VariableSummary> {
        let data = self.data.as_ref()?;
        let variable = self.settings.selected_variables.first()?;
        Some(summarize(data, variable))
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    match value.trim() {
        "" => fallback.to_string(),
        v => v.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
