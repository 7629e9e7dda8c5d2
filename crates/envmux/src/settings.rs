//! Persisted settings: global default manager ids and per-project
//! assignments.
//!
//! The resolver only ever reads overrides and defaults through the
//! [`SettingsStore`] trait; persistence mechanics stay behind it.
//! [`JsonSettingsStore`] is the bundled implementation: a pretty-printed
//! JSON file that falls back to defaults when missing or unreadable.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// One persisted override: which managers govern a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAssignment {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_manager_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager_id: Option<String>,
}

/// Scoped key-value store consulted during scope resolution.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Global default environment manager id, if configured.
    async fn default_environment_manager(&self) -> Option<String>;

    /// Global default package manager id, if configured.
    async fn default_package_manager(&self) -> Option<String>;

    /// Assignment for the project owning `resource`: the assignment with
    /// the longest path prefixing the resource.
    async fn assignment_for(&self, resource: &Path) -> Option<ProjectAssignment>;

    /// Insert or replace the assignment for `assignment.path`.
    async fn set_assignment(&self, assignment: ProjectAssignment) -> Result<()>;

    async fn remove_assignment(&self, project: &Path) -> Result<()>;

    async fn set_default_environment_manager(&self, id: Option<String>) -> Result<()>;

    async fn set_default_package_manager(&self, id: Option<String>) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsData {
    #[serde(skip_serializing_if = "Option::is_none")]
    default_environment_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_package_manager: Option<String>,
    #[serde(default)]
    assignments: Vec<ProjectAssignment>,
}

/// Default settings file location.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("envmux")
        .join("settings.json")
}

/// JSON-file-backed settings store.
pub struct JsonSettingsStore {
    path: PathBuf,
    data: StdMutex<SettingsData>,
}

impl JsonSettingsStore {
    /// Load settings from `path`, or start from defaults if the file is
    /// missing or invalid.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<SettingsData>(&contents) {
                Ok(data) => {
                    info!("[settings] loaded {:?}", path);
                    data
                }
                Err(err) => {
                    warn!("[settings] invalid settings file {:?}: {err}; using defaults", path);
                    SettingsData::default()
                }
            },
            Err(_) => {
                info!("[settings] no settings file at {:?}; using defaults", path);
                SettingsData::default()
            }
        };
        Self {
            path,
            data: StdMutex::new(data),
        }
    }

    fn save(&self, data: &SettingsData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn default_environment_manager(&self) -> Option<String> {
        self.data.lock().unwrap().default_environment_manager.clone()
    }

    async fn default_package_manager(&self) -> Option<String> {
        self.data.lock().unwrap().default_package_manager.clone()
    }

    async fn assignment_for(&self, resource: &Path) -> Option<ProjectAssignment> {
        let data = self.data.lock().unwrap();
        data.assignments
            .iter()
            .filter(|a| resource.starts_with(&a.path))
            .max_by_key(|a| a.path.components().count())
            .cloned()
    }

    async fn set_assignment(&self, assignment: ProjectAssignment) -> Result<()> {
        let snapshot = {
            let mut data = self.data.lock().unwrap();
            data.assignments.retain(|a| a.path != assignment.path);
            data.assignments.push(assignment);
            data.clone()
        };
        self.save(&snapshot)
    }

    async fn remove_assignment(&self, project: &Path) -> Result<()> {
        let snapshot = {
            let mut data = self.data.lock().unwrap();
            data.assignments.retain(|a| a.path != project);
            data.clone()
        };
        self.save(&snapshot)
    }

    async fn set_default_environment_manager(&self, id: Option<String>) -> Result<()> {
        let snapshot = {
            let mut data = self.data.lock().unwrap();
            data.default_environment_manager = id;
            data.clone()
        };
        self.save(&snapshot)
    }

    async fn set_default_package_manager(&self, id: Option<String>) -> Result<()> {
        let snapshot = {
            let mut data = self.data.lock().unwrap();
            data.default_package_manager = id;
            data.clone()
        };
        self.save(&snapshot)
    }
}
