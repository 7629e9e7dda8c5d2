//! Environment operations that feed the change-event hub.
//!
//! Every call here resolves "the current environment for scope X" and
//! must decide whether a change notification fires; that decision is
//! delegated to the [`ChangeEventHub`]'s last-observed table. Batch
//! operations run all underlying manager calls concurrently and only
//! dispatch their accumulated events once every call has settled.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::join_all;
use log::warn;
use manager_api::{ManagerError, PythonEnvironment, Scope};

use crate::events::{ChangeEventHub, EnvironmentChangeEvent};
use crate::resolve::{scope_uri, ScopeResolver};

/// High-level get/set/refresh over resolved environments.
pub struct EnvironmentService {
    resolver: Arc<ScopeResolver>,
    hub: Arc<ChangeEventHub>,
}

impl EnvironmentService {
    pub fn new(resolver: Arc<ScopeResolver>, hub: Arc<ChangeEventHub>) -> Self {
        Self { resolver, hub }
    }

    pub fn resolver(&self) -> &Arc<ScopeResolver> {
        &self.resolver
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EnvironmentChangeEvent> {
        self.hub.subscribe()
    }

    /// Current environment for a scope. Fires a change event only when
    /// the resolved identity differs from the last observation.
    ///
    /// A backend failure resolves nothing: it must not touch the
    /// last-observed table or fire a change event.
    pub async fn get_environment(&self, scope: &Scope) -> Option<PythonEnvironment> {
        let manager = self.resolver.get_environment_manager(scope).await?;
        let environment = match manager.manager().get(scope).await {
            Ok(env) => env,
            Err(err) => {
                warn!("[service] get failed for {}: {err}", manager.id);
                return None;
            }
        };
        self.hub.observe_and_dispatch(
            self.resolver.scope_key(scope),
            scope_uri(scope),
            environment.clone(),
        );
        environment
    }

    /// Bind (or clear) the environment for a scope.
    pub async fn set_environment(
        &self,
        scope: &Scope,
        environment: Option<PythonEnvironment>,
    ) -> Result<(), ManagerError> {
        let manager = self
            .resolver
            .get_environment_manager(scope)
            .await
            .ok_or_else(|| ManagerError::Other(anyhow!("no environment manager for scope")))?;
        manager.manager().set(scope, environment.as_ref()).await?;
        self.hub.observe_and_dispatch(
            self.resolver.scope_key(scope),
            scope_uri(scope),
            environment,
        );
        Ok(())
    }

    /// Assign one environment to many resources. All underlying `set`
    /// calls run concurrently; events are dispatched together once every
    /// call has settled. Per-resource failures are logged and skipped.
    pub async fn set_environments(
        &self,
        resources: &[PathBuf],
        environment: Option<PythonEnvironment>,
    ) {
        let calls = resources.iter().map(|path| {
            let scope = Scope::Resource(path.clone());
            let environment = environment.clone();
            async move {
                let manager = self.resolver.get_environment_manager(&scope).await?;
                match manager.manager().set(&scope, environment.as_ref()).await {
                    Ok(()) => Some((scope, environment)),
                    Err(err) => {
                        warn!("[service] set failed for {}: {err}", manager.id);
                        None
                    }
                }
            }
        });
        let settled = join_all(calls).await;

        let mut events = Vec::new();
        for (scope, environment) in settled.into_iter().flatten() {
            if let Some(event) = self.hub.observe(
                self.resolver.scope_key(&scope),
                scope_uri(&scope),
                environment,
            ) {
                events.push(event);
            }
        }
        self.hub.dispatch_all(events);
    }

    /// Re-run discovery for one scope, then re-resolve it.
    pub async fn refresh(&self, scope: &Scope) -> Result<(), ManagerError> {
        let manager = self
            .resolver
            .get_environment_manager(scope)
            .await
            .ok_or_else(|| ManagerError::Other(anyhow!("no environment manager for scope")))?;
        manager.manager().refresh(scope).await?;
        let environment = manager.manager().get(scope).await?;
        self.hub.observe_and_dispatch(
            self.resolver.scope_key(scope),
            scope_uri(scope),
            environment,
        );
        Ok(())
    }

    /// Refresh every registered manager and re-resolve every known scope
    /// (global plus each project root). Events accumulate and dispatch
    /// together after all calls settle.
    pub async fn refresh_all(&self) {
        let managers = self.resolver.registry().environment_managers();
        let refreshes = managers.iter().map(|m| {
            let m = Arc::clone(m);
            async move {
                if let Err(err) = m.manager().refresh(&Scope::Global).await {
                    warn!("[service] refresh failed for {}: {err}", m.id);
                }
            }
        });
        join_all(refreshes).await;

        let mut scopes = vec![Scope::Global];
        scopes.extend(
            self.resolver
                .projects()
                .projects()
                .into_iter()
                .map(Scope::Resource),
        );
        let lookups = scopes.into_iter().map(|scope| async move {
            let manager = self.resolver.get_environment_manager(&scope).await?;
            match manager.manager().get(&scope).await {
                Ok(environment) => Some((scope, environment)),
                Err(err) => {
                    warn!("[service] get failed for {}: {err}", manager.id);
                    None
                }
            }
        });
        let settled = join_all(lookups).await;

        let mut events = Vec::new();
        for (scope, environment) in settled.into_iter().flatten() {
            if let Some(event) = self.hub.observe(
                self.resolver.scope_key(&scope),
                scope_uri(&scope),
                environment,
            ) {
                events.push(event);
            }
        }
        self.hub.dispatch_all(events);
    }
}
