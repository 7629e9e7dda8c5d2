//! envmux - In-process coordination layer for Python environment and
//! package manager backends.
//!
//! Independently authored backends implement the `manager-api` traits
//! and register with the [`registry::ManagerRegistry`]. Callers then ask
//! a [`resolve::ScopeResolver`] or [`service::EnvironmentService`] which
//! manager and which concrete environment governs a scope, without
//! knowing which backends are installed.
//!
//! The other load-bearing pieces are the priority-ordered interpreter
//! path resolution protocol ([`interpreter`]) and the terminal
//! activation state machine with per-scope terminal caches
//! ([`terminal`]). Settings persistence and project layout are consumed
//! through narrow traits ([`settings`], [`projects`]); no concrete
//! backend, UI, or wire protocol lives here.

pub mod events;
pub mod interpreter;
pub mod progress;
pub mod projects;
pub mod registry;
pub mod resolve;
pub mod service;
pub mod settings;
pub mod terminal;
#[cfg(test)]
pub(crate) mod testing;

pub use events::{ChangeEventHub, EnvironmentChangeEvent, ScopeKey};
pub use interpreter::{resolve_interpreter, ResolvedInterpreter};
pub use progress::{ActivationPhase, EventSink, LogSink};
pub use projects::{ProjectLocator, StaticProjects};
pub use registry::{
    ManagerRegistry, RegisteredEnvManager, RegisteredPackageManager, RegistrationHandle,
    RegistryError, RegistryEvent,
};
pub use resolve::ScopeResolver;
pub use service::EnvironmentService;
pub use settings::{JsonSettingsStore, ProjectAssignment, SettingsStore};
pub use terminal::{
    ActivationError, ActivationOutcome, Terminal, TerminalActivationEngine, TerminalHost,
    TerminalOptions,
};
