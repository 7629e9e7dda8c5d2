//! The contract implemented by pluggable backends.
//!
//! Backends are registered as trait objects and every operation may
//! suspend on external I/O, so both traits are `async_trait` and
//! `Send + Sync`. Optional operations have default implementations that
//! reject with [`ManagerError::UnsupportedOperation`]; the corresponding
//! capability flags let the coordinator skip unsupported backends
//! without round-tripping an error.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::environment::{EnvironmentId, PythonEnvironment};
use crate::error::ManagerError;
use crate::package::{Installable, Package};
use crate::scope::Scope;

/// Capability flags for an environment manager, snapshotted at
/// registration time and immutable afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvManagerCapabilities {
    pub supports_create: bool,
    pub supports_remove: bool,
    pub supports_clear_cache: bool,
}

/// Capability flags for a package manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgManagerCapabilities {
    pub supports_get_installable: bool,
    pub supports_clear_cache: bool,
}

/// Change events an environment backend may emit.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// The environment governing `scope` changed.
    EnvironmentChanged {
        scope: Scope,
        environment: Option<PythonEnvironment>,
    },
    /// The set of environments for `scope` changed (created, removed,
    /// or rediscovered).
    EnvironmentListChanged { scope: Scope },
}

/// Change events a package backend may emit.
#[derive(Debug, Clone)]
pub enum PackageEvent {
    /// Installed packages changed for an environment.
    PackagesChanged { environment: EnvironmentId },
}

/// An environment manager backend (venv, conda, pyenv, ...).
#[async_trait]
pub trait EnvironmentManager: Send + Sync {
    /// Short name, unique within the registering namespace (e.g. "venv").
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Fully qualified id of the package manager this manager prefers
    /// for its environments, if it has an opinion.
    fn preferred_package_manager_id(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> EnvManagerCapabilities {
        EnvManagerCapabilities::default()
    }

    /// Event source for this backend's changes, if it emits any.
    ///
    /// Each call returns a fresh receiver; the registry subscribes once
    /// at registration and forwards on its own channel.
    fn subscribe(&self) -> Option<broadcast::Receiver<ManagerEvent>> {
        None
    }

    /// Claim an arbitrary interpreter path, returning the environment it
    /// belongs to when this manager recognizes it. `Ok(None)` means "not
    /// mine", letting the resolution protocol probe the next manager.
    async fn resolve(&self, interpreter: &Path) -> Result<Option<PythonEnvironment>, ManagerError>;

    /// Current environment bound to a scope.
    async fn get(&self, scope: &Scope) -> Result<Option<PythonEnvironment>, ManagerError>;

    /// Bind the environment for a scope (`None` clears the binding).
    async fn set(
        &self,
        scope: &Scope,
        environment: Option<&PythonEnvironment>,
    ) -> Result<(), ManagerError>;

    /// All environments this manager knows for a scope.
    async fn list(&self, scope: &Scope) -> Result<Vec<PythonEnvironment>, ManagerError>;

    /// Re-run discovery for a scope.
    async fn refresh(&self, scope: &Scope) -> Result<(), ManagerError>;

    /// Create a new environment. Guarded by `supports_create`.
    async fn create(&self, _scope: &Scope) -> Result<PythonEnvironment, ManagerError> {
        Err(ManagerError::unsupported(self.name(), "create"))
    }

    /// Remove an environment. Guarded by `supports_remove`.
    async fn remove(&self, _environment: &PythonEnvironment) -> Result<(), ManagerError> {
        Err(ManagerError::unsupported(self.name(), "remove"))
    }

    /// Drop internal discovery caches. Managers without caches need not
    /// override this; it is only broadcast to managers whose
    /// `supports_clear_cache` flag is set.
    async fn clear_cache(&self) -> Result<(), ManagerError> {
        Ok(())
    }
}

/// A package manager backend (pip, conda, poetry, ...).
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Short name, unique within the registering namespace (e.g. "pip").
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn capabilities(&self) -> PkgManagerCapabilities {
        PkgManagerCapabilities::default()
    }

    /// Event source for this backend's changes, if it emits any.
    fn subscribe(&self) -> Option<broadcast::Receiver<PackageEvent>> {
        None
    }

    async fn install(
        &self,
        environment: &PythonEnvironment,
        packages: &[String],
    ) -> Result<(), ManagerError>;

    async fn uninstall(
        &self,
        environment: &PythonEnvironment,
        packages: &[String],
    ) -> Result<(), ManagerError>;

    async fn get_packages(
        &self,
        environment: &PythonEnvironment,
    ) -> Result<Vec<Package>, ManagerError>;

    async fn refresh(&self, environment: &PythonEnvironment) -> Result<(), ManagerError>;

    /// Enumerate packages offered for installation. Guarded by
    /// `supports_get_installable`.
    async fn get_installable(
        &self,
        _environment: &PythonEnvironment,
    ) -> Result<Vec<Installable>, ManagerError> {
        Err(ManagerError::unsupported(self.name(), "get_installable"))
    }

    /// Drop internal caches. Only broadcast to managers whose
    /// `supports_clear_cache` flag is set.
    async fn clear_cache(&self) -> Result<(), ManagerError> {
        Ok(())
    }
}
