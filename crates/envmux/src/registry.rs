//! Manager registry: ownership of registered backends.
//!
//! The registry is the leaf of the coordination layer. It assigns each
//! backend a namespaced id, guards against duplicate registrations, and
//! forwards every backend-emitted change event on its own broadcast
//! channel via a spawned task, so delivery is decoupled from whatever
//! call stack (or internal iteration) the backend was in when it fired.
//!
//! Registration returns a [`RegistrationHandle`]; invoking its
//! `dispose()` unregisters the backend and schedules an asynchronous
//! `…Unregistered` notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use futures::future::join_all;
use log::{error, info, warn};
use manager_api::{
    EnvManagerCapabilities, EnvironmentManager, ManagerEvent, PackageEvent, PackageManager,
    PkgManagerCapabilities,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Failure of a single registration call. The registry's state is
/// unaffected; the conflicting backend is never admitted.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("environment manager already registered: {id}")]
    DuplicateEnvironmentManager { id: String },

    #[error("package manager already registered: {id}")]
    DuplicatePackageManager { id: String },
}

/// Events fanned out by the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    EnvironmentManagerRegistered { manager_id: String },
    EnvironmentManagerUnregistered { manager_id: String },
    PackageManagerRegistered { manager_id: String },
    PackageManagerUnregistered { manager_id: String },
    /// A backend's own change event, redispatched off the emitting call
    /// stack and tagged with the owning manager id.
    Environment {
        manager_id: String,
        event: ManagerEvent,
    },
    Package {
        manager_id: String,
        event: PackageEvent,
    },
}

/// A registered environment manager: metadata snapshotted at
/// registration plus the backend itself.
pub struct RegisteredEnvManager {
    pub id: String,
    pub display_name: String,
    pub preferred_package_manager_id: Option<String>,
    pub capabilities: EnvManagerCapabilities,
    manager: Arc<dyn EnvironmentManager>,
}

impl RegisteredEnvManager {
    pub fn manager(&self) -> &Arc<dyn EnvironmentManager> {
        &self.manager
    }
}

/// A registered package manager.
pub struct RegisteredPackageManager {
    pub id: String,
    pub display_name: String,
    pub capabilities: PkgManagerCapabilities,
    manager: Arc<dyn PackageManager>,
}

impl RegisteredPackageManager {
    pub fn manager(&self) -> &Arc<dyn PackageManager> {
        &self.manager
    }
}

struct EnvEntry {
    handle: Arc<RegisteredEnvManager>,
    forwarder: Option<JoinHandle<()>>,
}

struct PkgEntry {
    handle: Arc<RegisteredPackageManager>,
    forwarder: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    env: HashMap<String, EnvEntry>,
    pkg: HashMap<String, PkgEntry>,
}

/// Which map a registration handle points into.
#[derive(Debug, Clone, Copy)]
enum ManagerKind {
    Environment,
    Package,
}

/// Disposal handle returned by `register_*`. Invoking [`dispose`]
/// unregisters the backend; dropping the handle without disposing keeps
/// the registration alive for the registry's lifetime.
///
/// [`dispose`]: RegistrationHandle::dispose
#[derive(Debug)]
pub struct RegistrationHandle {
    registry: Weak<ManagerRegistry>,
    id: String,
    kind: ManagerKind,
}

impl RegistrationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unregister the backend this handle was issued for.
    pub fn dispose(self) {
        if let Some(registry) = self.registry.upgrade() {
            match self.kind {
                ManagerKind::Environment => registry.unregister_environment_manager(&self.id),
                ManagerKind::Package => registry.unregister_package_manager(&self.id),
            }
        }
    }
}

/// Owns the sets of registered environment and package managers.
///
/// Requires a tokio runtime context: event forwarding and the
/// asynchronous registration notifications run on spawned tasks.
pub struct ManagerRegistry {
    inner: StdMutex<Inner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ManagerRegistry {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: StdMutex::new(Inner::default()),
            events,
        })
    }

    /// Subscribe to registry events (registrations, unregistrations, and
    /// forwarded backend events).
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register an environment manager under `namespace`.
    ///
    /// The manager's id is `"<namespace>:<name>"`. The namespace is an
    /// explicit parameter supplied by the registering caller; ids must be
    /// globally unique and a duplicate fails the call without touching
    /// registry state.
    pub fn register_environment_manager(
        self: &Arc<Self>,
        namespace: &str,
        manager: Arc<dyn EnvironmentManager>,
    ) -> Result<RegistrationHandle, RegistryError> {
        let id = format!("{namespace}:{}", manager.name());
        let handle = Arc::new(RegisteredEnvManager {
            id: id.clone(),
            display_name: manager.display_name().to_string(),
            preferred_package_manager_id: manager.preferred_package_manager_id(),
            capabilities: manager.capabilities(),
            manager: Arc::clone(&manager),
        });

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.env.contains_key(&id) {
                error!("[registry] duplicate environment manager registration: {id}");
                return Err(RegistryError::DuplicateEnvironmentManager { id });
            }
            let forwarder = manager
                .subscribe()
                .map(|rx| self.spawn_env_forwarder(id.clone(), rx));
            inner.env.insert(id.clone(), EnvEntry { handle, forwarder });
        }

        info!("[registry] registered environment manager {id}");
        self.notify(RegistryEvent::EnvironmentManagerRegistered {
            manager_id: id.clone(),
        });
        Ok(RegistrationHandle {
            registry: Arc::downgrade(self),
            id,
            kind: ManagerKind::Environment,
        })
    }

    /// Register a package manager under `namespace`. Symmetric to
    /// [`register_environment_manager`](Self::register_environment_manager).
    pub fn register_package_manager(
        self: &Arc<Self>,
        namespace: &str,
        manager: Arc<dyn PackageManager>,
    ) -> Result<RegistrationHandle, RegistryError> {
        let id = format!("{namespace}:{}", manager.name());
        let handle = Arc::new(RegisteredPackageManager {
            id: id.clone(),
            display_name: manager.display_name().to_string(),
            capabilities: manager.capabilities(),
            manager: Arc::clone(&manager),
        });

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.pkg.contains_key(&id) {
                error!("[registry] duplicate package manager registration: {id}");
                return Err(RegistryError::DuplicatePackageManager { id });
            }
            let forwarder = manager
                .subscribe()
                .map(|rx| self.spawn_pkg_forwarder(id.clone(), rx));
            inner.pkg.insert(id.clone(), PkgEntry { handle, forwarder });
        }

        info!("[registry] registered package manager {id}");
        self.notify(RegistryEvent::PackageManagerRegistered {
            manager_id: id.clone(),
        });
        Ok(RegistrationHandle {
            registry: Arc::downgrade(self),
            id,
            kind: ManagerKind::Package,
        })
    }

    /// Look up an environment manager by fully qualified id.
    pub fn environment_manager(&self, id: &str) -> Option<Arc<RegisteredEnvManager>> {
        let inner = self.inner.lock().unwrap();
        inner.env.get(id).map(|e| Arc::clone(&e.handle))
    }

    /// Look up a package manager by fully qualified id.
    pub fn package_manager(&self, id: &str) -> Option<Arc<RegisteredPackageManager>> {
        let inner = self.inner.lock().unwrap();
        inner.pkg.get(id).map(|e| Arc::clone(&e.handle))
    }

    /// Snapshot of all registered environment managers.
    pub fn environment_managers(&self) -> Vec<Arc<RegisteredEnvManager>> {
        let inner = self.inner.lock().unwrap();
        inner.env.values().map(|e| Arc::clone(&e.handle)).collect()
    }

    /// Snapshot of all registered package managers.
    pub fn package_managers(&self) -> Vec<Arc<RegisteredPackageManager>> {
        let inner = self.inner.lock().unwrap();
        inner.pkg.values().map(|e| Arc::clone(&e.handle)).collect()
    }

    /// Broadcast a cache clear to every manager whose capability flag is
    /// set, awaiting all of them; completion order does not matter.
    pub async fn clear_all_caches(&self) {
        let (env, pkg) = {
            let inner = self.inner.lock().unwrap();
            let env: Vec<_> = inner
                .env
                .values()
                .filter(|e| e.handle.capabilities.supports_clear_cache)
                .map(|e| Arc::clone(&e.handle))
                .collect();
            let pkg: Vec<_> = inner
                .pkg
                .values()
                .filter(|e| e.handle.capabilities.supports_clear_cache)
                .map(|e| Arc::clone(&e.handle))
                .collect();
            (env, pkg)
        };

        let env_futs = env.iter().map(|m| {
            let m = Arc::clone(m);
            async move {
                if let Err(err) = m.manager().clear_cache().await {
                    warn!("[registry] clear_cache failed for {}: {err}", m.id);
                }
            }
        });
        let pkg_futs = pkg.iter().map(|m| {
            let m = Arc::clone(m);
            async move {
                if let Err(err) = m.manager().clear_cache().await {
                    warn!("[registry] clear_cache failed for {}: {err}", m.id);
                }
            }
        });
        futures::future::join(join_all(env_futs), join_all(pkg_futs)).await;
    }

    /// Remove an environment manager; fires an asynchronous
    /// unregistration event if the id was present.
    pub fn unregister_environment_manager(&self, id: &str) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            inner.env.remove(id)
        };
        if let Some(entry) = removed {
            if let Some(task) = entry.forwarder {
                task.abort();
            }
            info!("[registry] unregistered environment manager {id}");
            self.notify(RegistryEvent::EnvironmentManagerUnregistered {
                manager_id: id.to_string(),
            });
        }
    }

    /// Remove a package manager; fires an asynchronous unregistration
    /// event if the id was present.
    pub fn unregister_package_manager(&self, id: &str) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            inner.pkg.remove(id)
        };
        if let Some(entry) = removed {
            if let Some(task) = entry.forwarder {
                task.abort();
            }
            info!("[registry] unregistered package manager {id}");
            self.notify(RegistryEvent::PackageManagerUnregistered {
                manager_id: id.to_string(),
            });
        }
    }

    /// Drop every registration and stop all event forwarding.
    ///
    /// Subscribers keep their receivers; they observe `Closed` once the
    /// registry itself is dropped.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, entry) in inner.env.drain() {
            if let Some(task) = entry.forwarder {
                task.abort();
            }
        }
        for (_, entry) in inner.pkg.drain() {
            if let Some(task) = entry.forwarder {
                task.abort();
            }
        }
        info!("[registry] disposed");
    }

    /// Schedule an event on the next tick, off the caller's stack.
    fn notify(&self, event: RegistryEvent) {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let _ = tx.send(event);
        });
    }

    fn spawn_env_forwarder(
        &self,
        manager_id: String,
        mut rx: broadcast::Receiver<ManagerEvent>,
    ) -> JoinHandle<()> {
        let tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(RegistryEvent::Environment {
                            manager_id: manager_id.clone(),
                            event,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("[registry] {manager_id} event stream lagged by {n}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_pkg_forwarder(
        &self,
        manager_id: String,
        mut rx: broadcast::Receiver<PackageEvent>,
    ) -> JoinHandle<()> {
        let tx = self.events.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(RegistryEvent::Package {
                            manager_id: manager_id.clone(),
                            event,
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("[registry] {manager_id} event stream lagged by {n}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
