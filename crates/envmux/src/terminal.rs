//! Terminal activation engine and per-scope terminal caches.
//!
//! A terminal bound to a resolved environment goes through
//! `Created -> AwaitingShellIntegration -> (Activating | LegacyActivating)
//! -> Activated`, or `Failed` when the terminal closes first. The first
//! of {shell-integration available, timeout elapsed, terminal closed}
//! decides the branch; the race runs inside one `tokio::select!` so the
//! losing watchers are dropped the moment a branch wins, which is what
//! guarantees single-activation semantics.
//!
//! Terminals are cached per `(environment id, normalized working
//! directory)`. Every newly cached terminal registers a close listener
//! that evicts its own entry, so a stale handle is never returned.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, info};
use manager_api::{EnvironmentId, PythonEnvironment};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::progress::{ActivationPhase, EventSink};

/// How long to wait for shell integration before falling back to legacy
/// text injection.
pub const DEFAULT_SHELL_INTEGRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Irrecoverable activation failures. Never retried; the terminal's
/// cache entry is never created.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("terminal closed before activation completed")]
    TerminalClosed,

    #[error("shell integration rejected command: {command}")]
    CommandRejected { command: String },

    #[error("terminal host shut down")]
    HostShutDown,
}

/// Options for creating a terminal.
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    pub name: String,
    pub cwd: Option<PathBuf>,
}

/// A live terminal provided by the host.
pub trait Terminal: Send + Sync {
    fn id(&self) -> Uuid;

    /// Write literal text into the terminal's input stream.
    fn send_text(&self, text: &str);

    fn has_shell_integration(&self) -> bool;

    /// Execute through the shell-integration channel, returning a handle
    /// matched against execution-ended events. `None` when shell
    /// integration is not available.
    fn run_command(&self, command: &str) -> Option<Uuid>;
}

/// Terminal/shell host collaborator.
pub trait TerminalHost: Send + Sync {
    fn create(&self, options: TerminalOptions) -> Arc<dyn Terminal>;

    /// Terminal ids that have gained shell integration.
    fn shell_integration_events(&self) -> broadcast::Receiver<Uuid>;

    /// Terminal ids that have closed.
    fn closed_events(&self) -> broadcast::Receiver<Uuid>;

    /// Execution handles whose commands have finished.
    fn execution_ended_events(&self) -> broadcast::Receiver<Uuid>;
}

/// Which branch of the activation race completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Commands ran through the shell-integration channel, each awaited
    /// to completion.
    ShellIntegration,
    /// Timeout elapsed; commands were injected as literal text,
    /// fire-and-forget.
    Legacy,
    /// The environment has no activation commands.
    NoCommands,
}

type CacheKey = (EnvironmentId, PathBuf);
type TerminalCache = Arc<StdMutex<HashMap<CacheKey, Arc<dyn Terminal>>>>;

/// Drives terminal creation and activation, and owns the terminal
/// caches. Instance state with an explicit lifecycle, never a
/// process-wide singleton.
pub struct TerminalActivationEngine {
    host: Arc<dyn TerminalHost>,
    sink: Arc<dyn EventSink>,
    shell_integration_timeout: Duration,
    dedicated: TerminalCache,
    project: TerminalCache,
}

impl TerminalActivationEngine {
    pub fn new(host: Arc<dyn TerminalHost>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_timeout(host, sink, DEFAULT_SHELL_INTEGRATION_TIMEOUT)
    }

    pub fn with_timeout(
        host: Arc<dyn TerminalHost>,
        sink: Arc<dyn EventSink>,
        shell_integration_timeout: Duration,
    ) -> Self {
        Self {
            host,
            sink,
            shell_integration_timeout,
            dedicated: Arc::new(StdMutex::new(HashMap::new())),
            project: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Terminal dedicated to one runnable target, activated for
    /// `environment` and cached by `(environment, target)`. Without
    /// `create_new` a live cached entry is returned unchanged.
    pub async fn get_dedicated_terminal(
        &self,
        target: &Path,
        project: &Path,
        environment: &PythonEnvironment,
        create_new: bool,
    ) -> Result<Arc<dyn Terminal>, ActivationError> {
        let key = (environment.env_id.clone(), normalize_path(target));
        let options = TerminalOptions {
            name: format!("Python: {}", environment.display_name),
            cwd: Some(project.to_path_buf()),
        };
        self.cached_or_activate(&self.dedicated, key, options, environment, create_new)
            .await
    }

    /// Shared terminal for a project, cached by `(environment, project)`.
    pub async fn get_project_terminal(
        &self,
        project: &Path,
        environment: &PythonEnvironment,
        create_new: bool,
    ) -> Result<Arc<dyn Terminal>, ActivationError> {
        let key = (environment.env_id.clone(), normalize_path(project));
        let options = TerminalOptions {
            name: format!("Python: {}", environment.display_name),
            cwd: Some(project.to_path_buf()),
        };
        self.cached_or_activate(&self.project, key, options, environment, create_new)
            .await
    }

    /// Create a terminal and run the environment's activation commands
    /// through the state machine. Bypasses the caches.
    pub async fn create_activated_terminal(
        &self,
        options: TerminalOptions,
        environment: &PythonEnvironment,
    ) -> Result<(Arc<dyn Terminal>, ActivationOutcome), ActivationError> {
        // Subscribe before creating so no event can slip past.
        let mut integration = self.host.shell_integration_events();
        let mut closed = self.host.closed_events();
        let terminal = self.host.create(options);
        let outcome = self
            .activate(&terminal, environment, &mut integration, &mut closed)
            .await?;
        Ok((terminal, outcome))
    }

    async fn cached_or_activate(
        &self,
        cache: &TerminalCache,
        key: CacheKey,
        options: TerminalOptions,
        environment: &PythonEnvironment,
        create_new: bool,
    ) -> Result<Arc<dyn Terminal>, ActivationError> {
        if !create_new {
            if let Some(existing) = cache.lock().unwrap().get(&key) {
                debug!("[terminal] cache hit for {}", key.0);
                return Ok(Arc::clone(existing));
            }
        }

        // Take the close stream before activation so a close arriving
        // between activation and watcher startup is still seen.
        let close_stream = self.host.closed_events();
        let (terminal, _outcome) = self
            .create_activated_terminal(options, environment)
            .await?;
        cache
            .lock()
            .unwrap()
            .insert(key.clone(), Arc::clone(&terminal));
        watch_for_close(Arc::clone(cache), key, terminal.id(), close_stream);
        Ok(terminal)
    }

    async fn activate(
        &self,
        terminal: &Arc<dyn Terminal>,
        environment: &PythonEnvironment,
        integration: &mut broadcast::Receiver<Uuid>,
        closed: &mut broadcast::Receiver<Uuid>,
    ) -> Result<ActivationOutcome, ActivationError> {
        if environment.exec_info.activation.is_empty() {
            return Ok(ActivationOutcome::NoCommands);
        }

        let terminal_id = terminal.id();
        if !terminal.has_shell_integration() {
            self.sink
                .on_activation(ActivationPhase::AwaitingShellIntegration {
                    terminal: terminal_id.to_string(),
                });
            // First branch to complete wins; the other watchers are
            // dropped with the select.
            tokio::select! {
                res = wait_for(integration, terminal_id) => {
                    res?;
                }
                res = wait_for(closed, terminal_id) => {
                    res?;
                    return Err(ActivationError::TerminalClosed);
                }
                _ = tokio::time::sleep(self.shell_integration_timeout) => {
                    return Ok(self.activate_legacy(terminal.as_ref(), environment));
                }
            }
        }

        self.activate_with_shell_integration(terminal.as_ref(), environment, closed)
            .await?;
        Ok(ActivationOutcome::ShellIntegration)
    }

    /// Run each activation command through the shell-integration
    /// channel, awaiting its completion event before issuing the next.
    async fn activate_with_shell_integration(
        &self,
        terminal: &dyn Terminal,
        environment: &PythonEnvironment,
        closed: &mut broadcast::Receiver<Uuid>,
    ) -> Result<(), ActivationError> {
        let mut ended = self.host.execution_ended_events();
        let total = environment.exec_info.activation.len();
        for (index, spec) in environment.exec_info.activation.iter().enumerate() {
            let command = spec.command_line();
            self.sink.on_activation(ActivationPhase::RunningCommand {
                command: command.clone(),
                index: index + 1,
                total,
            });
            let execution = terminal
                .run_command(&command)
                .ok_or(ActivationError::CommandRejected { command })?;
            tokio::select! {
                res = wait_for(&mut ended, execution) => {
                    res?;
                }
                res = wait_for(closed, terminal.id()) => {
                    res?;
                    return Err(ActivationError::TerminalClosed);
                }
            }
        }
        self.sink.on_activation(ActivationPhase::Activated {
            environment: environment.display_name.clone(),
        });
        info!("[terminal] activated {} via shell integration", environment.env_id);
        Ok(())
    }

    /// Inject the activation commands as literal text. No completion
    /// signal exists on this path; activation is best-effort.
    fn activate_legacy(
        &self,
        terminal: &dyn Terminal,
        environment: &PythonEnvironment,
    ) -> ActivationOutcome {
        self.sink.on_activation(ActivationPhase::LegacyFallback {
            terminal: terminal.id().to_string(),
        });
        for spec in &environment.exec_info.activation {
            terminal.send_text(&format!("{}\n", spec.command_line()));
        }
        self.sink.on_activation(ActivationPhase::Activated {
            environment: environment.display_name.clone(),
        });
        info!("[terminal] activated {} via legacy injection", environment.env_id);
        ActivationOutcome::Legacy
    }
}

/// Wait until `id` appears on the stream. Lagged gaps are skipped; a
/// closed stream means the host is gone.
async fn wait_for(rx: &mut broadcast::Receiver<Uuid>, id: Uuid) -> Result<(), ActivationError> {
    loop {
        match rx.recv().await {
            Ok(got) if got == id => return Ok(()),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return Err(ActivationError::HostShutDown),
        }
    }
}

/// Evict the cache entry when its terminal closes. Skips eviction if a
/// `create_new` call has already replaced the entry with a different
/// terminal.
fn watch_for_close(
    cache: TerminalCache,
    key: CacheKey,
    terminal_id: Uuid,
    mut closed: broadcast::Receiver<Uuid>,
) {
    tokio::spawn(async move {
        loop {
            match closed.recv().await {
                Ok(id) if id == terminal_id => {
                    let mut map = cache.lock().unwrap();
                    if map.get(&key).map(|t| t.id()) == Some(terminal_id) {
                        map.remove(&key);
                        debug!("[terminal] evicted cached terminal for {}", key.0);
                    }
                    break;
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Lexical path cleanup: drops `.` components and resolves `..` without
/// touching the filesystem, so cache keys match across spellings of the
/// same directory. Leading `..` on relative paths is preserved; `..`
/// and `.` name different directories and must not share a key.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
