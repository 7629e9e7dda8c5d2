//! Fake backends shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::anyhow;
use async_trait::async_trait;
use manager_api::{
    EnvManagerCapabilities, EnvironmentId, EnvironmentManager, ExecInfo, ExecSpec, ManagerError,
    ManagerEvent, Package, PackageManager, PkgManagerCapabilities, PythonEnvironment, Scope,
};
use tokio::sync::broadcast;

/// Build a throwaway environment owned by `manager_id`.
pub fn env(manager_id: &str, id: &str) -> PythonEnvironment {
    PythonEnvironment {
        env_id: EnvironmentId::new(manager_id, id),
        display_name: id.to_string(),
        version: "3.12.0".to_string(),
        exec_info: ExecInfo {
            run: ExecSpec::new(format!("/envs/{id}/bin/python")),
            activated_run: None,
            activation: vec![ExecSpec::with_args("source", [format!("/envs/{id}/bin/activate")])],
        },
    }
}

/// Scriptable in-memory environment manager.
pub struct FakeEnvManager {
    name: String,
    preferred_pkg: Option<String>,
    capabilities: EnvManagerCapabilities,
    resolves: StdMutex<HashMap<PathBuf, PythonEnvironment>>,
    current: StdMutex<HashMap<String, PythonEnvironment>>,
    events: broadcast::Sender<ManagerEvent>,
    probe_log: Option<Arc<StdMutex<Vec<String>>>>,
    fail_next_get: AtomicBool,
    clear_cache_calls: AtomicUsize,
    set_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeEnvManager {
    pub fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            name: name.to_string(),
            preferred_pkg: None,
            capabilities: EnvManagerCapabilities::default(),
            resolves: StdMutex::new(HashMap::new()),
            current: StdMutex::new(HashMap::new()),
            events,
            probe_log: None,
            fail_next_get: AtomicBool::new(false),
            clear_cache_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_clear_cache_support(mut self) -> Self {
        self.capabilities.supports_clear_cache = true;
        self
    }

    pub fn with_preferred_package_manager(mut self, id: &str) -> Self {
        self.preferred_pkg = Some(id.to_string());
        self
    }

    /// Record probe order into a shared log (keyed by manager name).
    pub fn with_probe_log(mut self, log: Arc<StdMutex<Vec<String>>>) -> Self {
        self.probe_log = Some(log);
        self
    }

    /// Script `resolve(path)` to claim `path`.
    pub fn claims(self, path: &Path, environment: PythonEnvironment) -> Self {
        self.resolves
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), environment);
        self
    }

    /// Pre-seed the environment returned by `get` for a scope.
    pub fn bind(&self, scope: &Scope, environment: PythonEnvironment) {
        self.current
            .lock()
            .unwrap()
            .insert(scope_key(scope), environment);
    }

    pub fn emit(&self, event: ManagerEvent) {
        let _ = self.events.send(event);
    }

    /// Make the next `get` call fail, once.
    pub fn fail_next_get(&self) {
        self.fail_next_get.store(true, Ordering::SeqCst);
    }

    pub fn clear_cache_calls(&self) -> usize {
        self.clear_cache_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn scope_key(scope: &Scope) -> String {
    format!("{scope:?}")
}

#[async_trait]
impl EnvironmentManager for FakeEnvManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn preferred_package_manager_id(&self) -> Option<String> {
        self.preferred_pkg.clone()
    }

    fn capabilities(&self) -> EnvManagerCapabilities {
        self.capabilities
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ManagerEvent>> {
        Some(self.events.subscribe())
    }

    async fn resolve(&self, interpreter: &Path) -> Result<Option<PythonEnvironment>, ManagerError> {
        if let Some(log) = &self.probe_log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(self.resolves.lock().unwrap().get(interpreter).cloned())
    }

    async fn get(&self, scope: &Scope) -> Result<Option<PythonEnvironment>, ManagerError> {
        if self.fail_next_get.swap(false, Ordering::SeqCst) {
            return Err(ManagerError::Other(anyhow!("backend unavailable")));
        }
        Ok(self.current.lock().unwrap().get(&scope_key(scope)).cloned())
    }

    async fn set(
        &self,
        scope: &Scope,
        environment: Option<&PythonEnvironment>,
    ) -> Result<(), ManagerError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.lock().unwrap();
        match environment {
            Some(env) => current.insert(scope_key(scope), env.clone()),
            None => current.remove(&scope_key(scope)),
        };
        Ok(())
    }

    async fn list(&self, _scope: &Scope) -> Result<Vec<PythonEnvironment>, ManagerError> {
        Ok(self.current.lock().unwrap().values().cloned().collect())
    }

    async fn refresh(&self, _scope: &Scope) -> Result<(), ManagerError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), ManagerError> {
        self.clear_cache_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Minimal scriptable package manager.
pub struct FakePackageManager {
    name: String,
    capabilities: PkgManagerCapabilities,
    packages: StdMutex<Vec<Package>>,
    clear_cache_calls: AtomicUsize,
}

impl FakePackageManager {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: PkgManagerCapabilities::default(),
            packages: StdMutex::new(Vec::new()),
            clear_cache_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_clear_cache_support(mut self) -> Self {
        self.capabilities.supports_clear_cache = true;
        self
    }

    pub fn clear_cache_calls(&self) -> usize {
        self.clear_cache_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackageManager for FakePackageManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> PkgManagerCapabilities {
        self.capabilities
    }

    async fn install(
        &self,
        environment: &PythonEnvironment,
        packages: &[String],
    ) -> Result<(), ManagerError> {
        let mut installed = self.packages.lock().unwrap();
        for name in packages {
            installed.push(Package {
                pkg_id: manager_api::PackageId::new(
                    format!("test:{}", self.name),
                    format!("{}@{name}", environment.env_id),
                ),
                name: name.clone(),
                version: None,
            });
        }
        Ok(())
    }

    async fn uninstall(
        &self,
        _environment: &PythonEnvironment,
        packages: &[String],
    ) -> Result<(), ManagerError> {
        self.packages
            .lock()
            .unwrap()
            .retain(|p| !packages.contains(&p.name));
        Ok(())
    }

    async fn get_packages(
        &self,
        _environment: &PythonEnvironment,
    ) -> Result<Vec<Package>, ManagerError> {
        Ok(self.packages.lock().unwrap().clone())
    }

    async fn refresh(&self, _environment: &PythonEnvironment) -> Result<(), ManagerError> {
        Ok(())
    }

    async fn clear_cache(&self) -> Result<(), ManagerError> {
        self.clear_cache_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
