//! Priority-ordered interpreter path resolution.
//!
//! Given an arbitrary interpreter path, discover which registered
//! manager can adopt it. Two sequential phases: managers already bound
//! to the caller's projects first (cheap, likely correct), then every
//! remaining registered manager (guards against interpreters created by
//! tools other than the project's configured manager). Within each
//! phase, managers are probed one at a time in the fixed
//! [`priority_rank`] order and the first defined answer wins.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, warn};
use manager_api::{priority_rank, PythonEnvironment};
use tokio_util::sync::CancellationToken;

use crate::progress::EventSink;
use crate::registry::RegisteredEnvManager;

/// A successful adoption: the winning manager and the environment it
/// produced for the path.
#[derive(Debug, Clone)]
pub struct ResolvedInterpreter {
    pub manager_id: String,
    pub environment: PythonEnvironment,
}

enum ProbeOutcome {
    Found(ResolvedInterpreter),
    Cancelled,
    Exhausted,
}

/// Resolve `interpreter` to the manager that claims it.
///
/// `project_managers` are the managers already bound to projects
/// relevant to the call site; `all_managers` is the full registered
/// list. Cancellation is honored between probes and yields `None`
/// without an error. Exhausting both phases is terminal: it logs, tells
/// the user through `sink`, and returns `None`; callers must not retry.
pub async fn resolve_interpreter(
    interpreter: &Path,
    token: &CancellationToken,
    project_managers: Vec<Arc<RegisteredEnvManager>>,
    all_managers: Vec<Arc<RegisteredEnvManager>>,
    sink: &dyn EventSink,
) -> Option<ResolvedInterpreter> {
    let mut tried: HashSet<String> = HashSet::new();

    let mut phase_one = project_managers;
    phase_one.sort_by_key(|m| priority_rank(&m.id));
    match probe_sequence(interpreter, token, &phase_one, &mut tried).await {
        ProbeOutcome::Found(resolved) => return Some(resolved),
        ProbeOutcome::Cancelled => return None,
        ProbeOutcome::Exhausted => {}
    }

    let mut phase_two: Vec<_> = all_managers
        .into_iter()
        .filter(|m| !tried.contains(&m.id))
        .collect();
    phase_two.sort_by_key(|m| priority_rank(&m.id));
    match probe_sequence(interpreter, token, &phase_two, &mut tried).await {
        ProbeOutcome::Found(resolved) => return Some(resolved),
        ProbeOutcome::Cancelled => return None,
        ProbeOutcome::Exhausted => {}
    }

    error!("[interpreter] no registered manager claims {interpreter:?}");
    sink.on_error(&format!(
        "Unable to determine the environment manager for {}",
        interpreter.display()
    ));
    None
}

async fn probe_sequence(
    interpreter: &Path,
    token: &CancellationToken,
    managers: &[Arc<RegisteredEnvManager>],
    tried: &mut HashSet<String>,
) -> ProbeOutcome {
    for manager in managers {
        if token.is_cancelled() {
            debug!("[interpreter] resolution cancelled before probing {}", manager.id);
            return ProbeOutcome::Cancelled;
        }
        tried.insert(manager.id.clone());
        match manager.manager().resolve(interpreter).await {
            Ok(Some(environment)) => {
                debug!("[interpreter] {} claimed {interpreter:?}", manager.id);
                return ProbeOutcome::Found(ResolvedInterpreter {
                    manager_id: manager.id.clone(),
                    environment,
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!("[interpreter] {} failed probing {interpreter:?}: {err}", manager.id);
            }
        }
    }
    ProbeOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ManagerRegistry;
    use crate::testing::{env, FakeEnvManager};
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    struct CountingSink {
        errors: StdMutex<Vec<String>>,
    }

    impl CountingSink {
        fn new() -> Self {
            Self {
                errors: StdMutex::new(Vec::new()),
            }
        }
    }

    impl EventSink for CountingSink {
        fn on_activation(&self, _phase: crate::progress::ActivationPhase) {}

        fn on_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn interpreter_path() -> PathBuf {
        PathBuf::from("/envs/x/bin/python")
    }

    #[tokio::test]
    async fn test_highest_priority_claimant_wins() {
        let registry = ManagerRegistry::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let path = interpreter_path();

        for name in ["customTool", "venv", "pyenv"] {
            let manager = FakeEnvManager::new(name)
                .with_probe_log(Arc::clone(&log))
                .claims(&path, env(&format!("acme:{name}"), "e"));
            registry
                .register_environment_manager("acme", Arc::new(manager))
                .unwrap();
        }

        let managers = registry.environment_managers();
        let resolved = resolve_interpreter(
            &path,
            &CancellationToken::new(),
            vec![],
            managers,
            &CountingSink::new(),
        )
        .await
        .unwrap();

        assert_eq!(resolved.manager_id, "acme:pyenv");
        // First probe wins; nothing after it is asked.
        assert_eq!(log.lock().unwrap().as_slice(), ["pyenv"]);
    }

    #[tokio::test]
    async fn test_two_phase_fallback() {
        let registry = ManagerRegistry::new();
        let path = interpreter_path();

        // Project-bound manager declines; a lower-priority global one claims.
        let project = Arc::new(FakeEnvManager::new("pyenv"));
        let global =
            Arc::new(FakeEnvManager::new("venv").claims(&path, env("acme:venv", "adopted")));
        registry
            .register_environment_manager("acme", project)
            .unwrap();
        registry
            .register_environment_manager("acme", global)
            .unwrap();

        let project_managers = vec![registry.environment_manager("acme:pyenv").unwrap()];
        let resolved = resolve_interpreter(
            &path,
            &CancellationToken::new(),
            project_managers,
            registry.environment_managers(),
            &CountingSink::new(),
        )
        .await
        .unwrap();
        assert_eq!(resolved.manager_id, "acme:venv");
    }

    #[tokio::test]
    async fn test_cancellation_returns_none_without_error() {
        let registry = ManagerRegistry::new();
        let path = interpreter_path();
        registry
            .register_environment_manager(
                "acme",
                Arc::new(FakeEnvManager::new("venv").claims(&path, env("acme:venv", "e"))),
            )
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let sink = CountingSink::new();
        let resolved = resolve_interpreter(
            &path,
            &token,
            vec![],
            registry.environment_managers(),
            &sink,
        )
        .await;

        assert!(resolved.is_none());
        // Cancellation is not a failure; no user-visible error.
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_reports_terminal_failure() {
        let registry = ManagerRegistry::new();
        registry
            .register_environment_manager("acme", Arc::new(FakeEnvManager::new("venv")))
            .unwrap();

        let sink = CountingSink::new();
        let resolved = resolve_interpreter(
            &interpreter_path(),
            &CancellationToken::new(),
            vec![],
            registry.environment_managers(),
            &sink,
        )
        .await;

        assert!(resolved.is_none());
        assert_eq!(sink.errors.lock().unwrap().len(), 1);
    }
}
