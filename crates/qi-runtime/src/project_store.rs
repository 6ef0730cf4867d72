//! Multi-project persistence on top of [`KeyValueStore`].
//!
//! Projects live as one JSON array under [`PROJECTS_KEY`]; the id of the
//! active project under [`ACTIVE_KEY`]. A single-project state from older
//! installs ([`LEGACY_STATE_KEY`]) is migrated on open.

use chrono::Utc;
use qi_core::error::{QiError, Result};
use qi_core::models::{Intervention, Project, ProjectSettings};
use qi_data::variables::{summarize, VariableSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::KeyValueStore;

pub const PROJECTS_KEY: &str = "qi-dashboard-projects";
pub const ACTIVE_KEY: &str = "qi-dashboard-active";
pub const LEGACY_STATE_KEY: &str = "qi-dashboard-state";

const UNTITLED_PROJECT: &str = "Untitled Project";
const IMPORTED_PROJECT: &str = "Imported Project";

/// Shape of the pre-project single dashboard state.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyState {
    selected_variables: Vec<String>,
    goal_value: Option<f64>,
    interventions: Vec<Intervention>,
}

/// Card shown for each project in the overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub row_count: usize,
    pub intervention_count: usize,
    /// Headline for the first selected variable, when the project has data.
    pub summary: Option<VariableSummary>,
}

impl From<&Project> for ProjectCard {
    fn from(project: &Project) -> Self {
        let summary = match (&project.data, project.settings.selected_variables.first()) {
            (Some(data), Some(variable)) if !data.is_empty() => Some(summarize(data, variable)),
            _ => None,
        };
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            row_count: project.data.as_ref().map_or(0, |d| d.len()),
            intervention_count: project.settings.interventions.len(),
            summary,
        }
    }
}

pub struct ProjectStore {
    kv: KeyValueStore,
    projects: Vec<Project>,
    active: Option<String>,
}

impl ProjectStore {
    /// Load projects from `kv`, migrating legacy state first.
    pub fn open(mut kv: KeyValueStore) -> Result<Self> {
        Self::migrate_legacy(&mut kv)?;

        let projects = match kv.get(PROJECTS_KEY) {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
                warn!(error = %e, "stored projects are unreadable; starting with none");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let active = kv.get(ACTIVE_KEY).map(str::to_string);

        Ok(Self {
            kv,
            projects,
            active,
        })
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn cards(&self) -> Vec<ProjectCard> {
        self.projects.iter().map(ProjectCard::from).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Look a project up by exact name.
    pub fn find_by_name(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Create a project and make it active. The name is required.
    pub fn create(&mut self, name: &str, description: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(QiError::InvalidInput("project name is required".to_string()));
        }
        let project = Project::new(name, description.trim());
        self.projects.push(project.clone());
        self.persist()?;
        self.set_active(&project.id)?;
        info!(id = %project.id, "created project {:?}", project.name);
        Ok(project)
    }

    /// Replace the stored copy of `project` (matched by id).
    ///
    /// A blank name is stored as `Untitled Project`; `updated_at` is bumped.
    pub fn save(&mut self, project: &Project) -> Result<Project> {
        let index = self
            .projects
            .iter()
            .position(|p| p.id == project.id)
            .ok_or_else(|| QiError::ProjectNotFound(project.id.clone()))?;

        let mut saved = project.clone();
        saved.name = match project.name.trim() {
            "" => UNTITLED_PROJECT.to_string(),
            name => name.to_string(),
        };
        saved.description = project.description.trim().to_string();
        saved.updated_at = Utc::now();

        self.projects[index] = saved.clone();
        self.persist()?;
        Ok(saved)
    }

    /// Remove a project. Clears the active marker when it pointed at it.
    pub fn delete(&mut self, id: &str) -> Result<Project> {
        let index = self
            .projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| QiError::ProjectNotFound(id.to_string()))?;
        let removed = self.projects.remove(index);
        self.persist()?;

        if self.active.as_deref() == Some(id) {
            self.active = None;
            self.kv.remove(ACTIVE_KEY)?;
        }
        info!(id, "deleted project {:?}", removed.name);
        Ok(removed)
    }

    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(QiError::ProjectNotFound(id.to_string()));
        }
        self.kv.set(ACTIVE_KEY, id)?;
        self.active = Some(id.to_string());
        Ok(())
    }

    /// The active project, if it still exists.
    pub fn active(&self) -> Option<&Project> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    fn persist(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.projects)?;
        self.kv.set(PROJECTS_KEY, json)
    }

    /// Wrap a legacy single-dashboard state into one active project.
    ///
    /// Runs only when the legacy key exists and no project list does. An
    /// unreadable legacy state is logged and left alone.
    fn migrate_legacy(kv: &mut KeyValueStore) -> Result<()> {
        if kv.contains(PROJECTS_KEY) {
            return Ok(());
        }
        let Some(raw) = kv.get(LEGACY_STATE_KEY) else {
            return Ok(());
        };
        let legacy: LegacyState = match serde_json::from_str(raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "legacy dashboard state is unreadable; skipping migration");
                return Ok(());
            }
        };

        let mut project = Project::new(IMPORTED_PROJECT, "Migrated from previous version");
        project.settings = ProjectSettings {
            selected_variables: legacy.selected_variables,
            goal_value: legacy.goal_value.filter(|g| g.is_finite()),
            interventions: legacy.interventions,
            ..ProjectSettings::default()
        };

        kv.set(PROJECTS_KEY, serde_json::to_string(&[&project])?)?;
        kv.set(ACTIVE_KEY, project.id.as_str())?;
        info!(id = %project.id, "migrated legacy dashboard state");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use qi_core::models::{Cell, Dataset, Row};
    use tempfile::TempDir;

    fn open(tmp: &TempDir) -> ProjectStore {
        let kv = KeyValueStore::open(&tmp.path().join("store.json")).unwrap();
        ProjectStore::open(kv).unwrap()
    }

    // ── create / list / active ────────────────────────────────────────────────

    #[test]
    fn test_create_requires_name() {
        let mut store = ProjectStore::open(KeyValueStore::in_memory()).unwrap();
        assert!(matches!(store.create("   ", ""), Err(QiError::InvalidInput(_))));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_create_persists_and_activates() {
        let tmp = TempDir::new().expect("tempdir");
        let id = {
            let mut store = open(&tmp);
            store.create("  ABX stewardship ", "PICU").unwrap().id
        };

        let store = open(&tmp);
        assert_eq!(store.list().len(), 1);
        let active = store.active().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.name, "ABX stewardship");
        assert!(active.settings.show_median);
    }

    #[test]
    fn test_set_active_unknown_project() {
        let mut store = ProjectStore::open(KeyValueStore::in_memory()).unwrap();
        assert!(matches!(store.set_active("nope"), Err(QiError::ProjectNotFound(_))));
    }

    // ── save / delete ─────────────────────────────────────────────────────────

    #[test]
    fn test_save_blank_name_becomes_untitled() {
        let mut store = ProjectStore::open(KeyValueStore::in_memory()).unwrap();
        let mut project = store.create("First", "").unwrap();
        project.name = "  ".to_string();
        project.settings.goal_value = Some(10.0);

        let saved = store.save(&project).unwrap();
        assert_eq!(saved.name, "Untitled Project");
        assert!(saved.updated_at >= saved.created_at);
        assert_eq!(store.get(&project.id).unwrap().settings.goal_value, Some(10.0));
    }

    #[test]
    fn test_save_unknown_project() {
        let mut store = ProjectStore::open(KeyValueStore::in_memory()).unwrap();
        let stray = Project::new("Stray", "");
        assert!(matches!(store.save(&stray), Err(QiError::ProjectNotFound(_))));
    }

    #[test]
    fn test_delete_clears_active() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = open(&tmp);
        let keep = store.create("Keep", "").unwrap();
        let gone = store.create("Drop", "").unwrap();

        store.delete(&gone.id).unwrap();
        assert!(store.active().is_none());
        assert!(store.get(&keep.id).is_some());

        let reopened = open(&tmp);
        assert_eq!(reopened.list().len(), 1);
        assert!(reopened.active().is_none());
    }

    // ── migration ─────────────────────────────────────────────────────────────

    #[test]
    fn test_legacy_state_is_migrated() {
        let mut kv = KeyValueStore::in_memory();
        kv.set(
            LEGACY_STATE_KEY,
            r#"{"selectedVariables":["ABX_RATE"],"goalValue":12.5,
                "interventions":[{"id":"i1","date":"2024-02-01","label":"Order set"}]}"#,
        )
        .unwrap();

        let store = ProjectStore::open(kv).unwrap();
        let project = store.active().unwrap();
        assert_eq!(project.name, "Imported Project");
        assert_eq!(project.settings.selected_variables, vec!["ABX_RATE"]);
        assert_eq!(project.settings.goal_value, Some(12.5));
        assert_eq!(project.settings.interventions[0].label, "Order set");
        assert!(project.data.is_none());
    }

    #[test]
    fn test_legacy_ignored_when_projects_exist() {
        let mut kv = KeyValueStore::in_memory();
        kv.set(PROJECTS_KEY, "[]").unwrap();
        kv.set(LEGACY_STATE_KEY, r#"{"selectedVariables":["A"]}"#).unwrap();

        let store = ProjectStore::open(kv).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_unreadable_legacy_state_is_skipped() {
        let mut kv = KeyValueStore::in_memory();
        kv.set(LEGACY_STATE_KEY, "{broken").unwrap();
        let store = ProjectStore::open(kv).unwrap();
        assert!(store.list().is_empty());
    }

    // ── cards ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_card_summarises_first_variable() {
        let mut store = ProjectStore::open(KeyValueStore::in_memory()).unwrap();
        let mut project = store.create("Rates", "").unwrap();

        let columns = vec!["date".to_string(), "ABX_RATE".to_string()];
        let rows: Vec<Row> = (0..10)
            .map(|i| {
                let mut row = Row::new();
                row.insert("date".into(), Cell::Text(format!("2024-01-{:02}", i + 1)));
                row.insert("ABX_RATE".into(), Cell::Number(if i < 5 { 10.0 } else { 20.0 }));
                row
            })
            .collect();
        project.data = Some(Dataset::new(columns, rows));
        project.settings.selected_variables = vec!["ABX_RATE".to_string()];
        store.save(&project).unwrap();

        let card = &store.cards()[0];
        assert_eq!(card.row_count, 10);
        let summary = card.summary.as_ref().unwrap();
        assert_eq!(summary.current_value, "20.0%");
        assert_eq!(summary.trend, qi_data::variables::Trend::Up);
    }
}
