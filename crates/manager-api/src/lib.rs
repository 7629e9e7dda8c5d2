//! manager-api - Contract between the envmux coordination layer and
//! pluggable Python environment/package manager backends.
//!
//! A backend (venv, conda, pyenv, a system-interpreter prober, ...)
//! implements [`EnvironmentManager`] and/or [`PackageManager`] and
//! registers itself with the coordinator. Everything the coordinator
//! needs to know about a backend flows through these traits: discovery
//! (`resolve`, `get`, `list`), binding (`set`), optional lifecycle
//! operations (`create`, `remove`, `clear_cache`), and change events
//! emitted over a broadcast channel.

pub mod environment;
pub mod error;
pub mod kind;
pub mod manager;
pub mod package;
pub mod scope;

pub use environment::{EnvironmentId, ExecInfo, ExecSpec, PythonEnvironment};
pub use error::ManagerError;
pub use kind::{priority_rank, KnownManagerKind};
pub use manager::{
    EnvManagerCapabilities, EnvironmentManager, ManagerEvent, PackageEvent, PackageManager,
    PkgManagerCapabilities,
};
pub use package::{Installable, Package, PackageId};
pub use scope::Scope;
