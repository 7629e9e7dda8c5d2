//! Scope resolution: which manager governs a scope.
//!
//! Resolution never errors. A scope that cannot be resolved (no backend
//! registered, no assignment, no configured default) logs and returns
//! `None`; the caller decides what to surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, warn};
use manager_api::Scope;

use crate::events::ScopeKey;
use crate::projects::ProjectLocator;
use crate::registry::{ManagerRegistry, RegisteredEnvManager, RegisteredPackageManager};
use crate::settings::SettingsStore;

/// Resolves scopes to the registered manager that governs them,
/// consulting persisted per-project overrides and global defaults.
pub struct ScopeResolver {
    registry: Arc<ManagerRegistry>,
    settings: Arc<dyn SettingsStore>,
    projects: Arc<dyn ProjectLocator>,
}

impl ScopeResolver {
    pub fn new(
        registry: Arc<ManagerRegistry>,
        settings: Arc<dyn SettingsStore>,
        projects: Arc<dyn ProjectLocator>,
    ) -> Self {
        Self {
            registry,
            settings,
            projects,
        }
    }

    pub fn registry(&self) -> &Arc<ManagerRegistry> {
        &self.registry
    }

    pub fn projects(&self) -> &Arc<dyn ProjectLocator> {
        &self.projects
    }

    /// Dedup-table key for a scope: the owning project's path for
    /// resource scopes (the resource itself when no project owns it),
    /// global for everything else.
    pub fn scope_key(&self, scope: &Scope) -> ScopeKey {
        match scope {
            Scope::Resource(path) => ScopeKey::Project(
                self.projects
                    .project_for(path)
                    .unwrap_or_else(|| path.clone()),
            ),
            _ => ScopeKey::Global,
        }
    }

    /// The environment manager governing `scope`.
    pub async fn get_environment_manager(
        &self,
        scope: &Scope,
    ) -> Option<Arc<RegisteredEnvManager>> {
        if self.registry.environment_managers().is_empty() {
            error!("[resolve] no environment managers registered");
            return None;
        }
        match scope {
            Scope::Manager(id) => self.lookup_env(id),
            Scope::Environment(env_id) => self.lookup_env(&env_id.manager_id),
            Scope::Package(pkg_id) => {
                warn!(
                    "[resolve] package scope {pkg_id} cannot resolve an environment manager"
                );
                None
            }
            Scope::Global => self.configured_env_manager(None).await,
            Scope::Resource(path) => self.configured_env_manager(Some(path)).await,
        }
    }

    /// The package manager governing `scope`.
    pub async fn get_package_manager(
        &self,
        scope: &Scope,
    ) -> Option<Arc<RegisteredPackageManager>> {
        if self.registry.package_managers().is_empty() {
            error!("[resolve] no package managers registered");
            return None;
        }
        match scope {
            Scope::Manager(id) => self.lookup_pkg(id),
            Scope::Package(pkg_id) => self.lookup_pkg(&pkg_id.manager_id),
            Scope::Environment(env_id) => self.preferred_of(&env_id.manager_id),
            Scope::Global => self.configured_pkg_manager(None).await,
            Scope::Resource(path) => self.configured_pkg_manager(Some(path)).await,
        }
    }

    /// Clear caches for a scope: global broadcasts to every capable
    /// manager, anything else delegates to the single resolved manager
    /// (no-op when it lacks the capability). Scopes that identify a
    /// package manager route to it, not to an environment manager.
    pub async fn clear_cache(&self, scope: &Scope) {
        match scope {
            Scope::Global => self.registry.clear_all_caches().await,
            Scope::Package(_) => self.clear_pkg_cache(scope).await,
            Scope::Manager(id) => {
                if self.registry.environment_manager(id).is_some() {
                    self.clear_env_cache(scope).await;
                } else {
                    self.clear_pkg_cache(scope).await;
                }
            }
            _ => self.clear_env_cache(scope).await,
        }
    }

    async fn clear_env_cache(&self, scope: &Scope) {
        if let Some(manager) = self.get_environment_manager(scope).await {
            if !manager.capabilities.supports_clear_cache {
                return;
            }
            if let Err(err) = manager.manager().clear_cache().await {
                warn!("[resolve] clear_cache failed for {}: {err}", manager.id);
            }
        }
    }

    async fn clear_pkg_cache(&self, scope: &Scope) {
        if let Some(manager) = self.get_package_manager(scope).await {
            if !manager.capabilities.supports_clear_cache {
                return;
            }
            if let Err(err) = manager.manager().clear_cache().await {
                warn!("[resolve] clear_cache failed for {}: {err}", manager.id);
            }
        }
    }

    async fn configured_env_manager(
        &self,
        resource: Option<&Path>,
    ) -> Option<Arc<RegisteredEnvManager>> {
        if let Some(path) = resource {
            if let Some(assignment) = self.settings.assignment_for(path).await {
                if let Some(id) = &assignment.env_manager_id {
                    return self.lookup_env(id);
                }
            }
        }
        match self.settings.default_environment_manager().await {
            Some(id) => self.lookup_env(&id),
            None => {
                error!("[resolve] no environment manager configured for scope");
                None
            }
        }
    }

    async fn configured_pkg_manager(
        &self,
        resource: Option<&Path>,
    ) -> Option<Arc<RegisteredPackageManager>> {
        if let Some(path) = resource {
            if let Some(assignment) = self.settings.assignment_for(path).await {
                if let Some(id) = &assignment.package_manager_id {
                    return self.lookup_pkg(id);
                }
            }
        }
        if let Some(id) = self.settings.default_package_manager().await {
            return self.lookup_pkg(&id);
        }
        // No override and no default: fall through to the resolved
        // environment manager's preference.
        let scope = match resource {
            Some(path) => Scope::Resource(path.to_path_buf()),
            None => Scope::Global,
        };
        let env_manager = self.get_environment_manager(&scope).await?;
        match &env_manager.preferred_package_manager_id {
            Some(id) => self.lookup_pkg(id),
            None => {
                error!(
                    "[resolve] no package manager configured and {} has no preference",
                    env_manager.id
                );
                None
            }
        }
    }

    fn preferred_of(&self, env_manager_id: &str) -> Option<Arc<RegisteredPackageManager>> {
        let env_manager = self.lookup_env(env_manager_id)?;
        match &env_manager.preferred_package_manager_id {
            Some(id) => self.lookup_pkg(id),
            None => {
                error!("[resolve] {env_manager_id} has no preferred package manager");
                None
            }
        }
    }

    fn lookup_env(&self, id: &str) -> Option<Arc<RegisteredEnvManager>> {
        let found = self.registry.environment_manager(id);
        if found.is_none() {
            error!("[resolve] environment manager not registered: {id}");
        }
        found
    }

    fn lookup_pkg(&self, id: &str) -> Option<Arc<RegisteredPackageManager>> {
        let found = self.registry.package_manager(id);
        if found.is_none() {
            error!("[resolve] package manager not registered: {id}");
        }
        found
    }
}

/// Scope key helper shared with the service layer.
pub(crate) fn scope_uri(scope: &Scope) -> Option<PathBuf> {
    scope.resource_path().map(Path::to_path_buf)
}
