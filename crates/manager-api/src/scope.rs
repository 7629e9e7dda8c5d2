//! Scope addressing for manager and environment resolution.

use std::path::{Path, PathBuf};

use crate::environment::EnvironmentId;
use crate::package::PackageId;

/// Addresses which manager or environment a call applies to.
///
/// Both scope resolution and change-event bookkeeping take scopes, so
/// callers never need to know which backend is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The process-wide default scope.
    Global,
    /// A file or directory on disk, resolved to its owning project.
    Resource(PathBuf),
    /// A specific manager by fully qualified id.
    Manager(String),
    /// A specific environment. Already identifies its owning manager,
    /// so no settings lookup is needed to resolve it.
    Environment(EnvironmentId),
    /// A specific package record.
    Package(PackageId),
}

impl Scope {
    pub fn resource(path: impl Into<PathBuf>) -> Self {
        Scope::Resource(path.into())
    }

    /// The resource path, when this scope carries one.
    pub fn resource_path(&self) -> Option<&Path> {
        match self {
            Scope::Resource(path) => Some(path),
            _ => None,
        }
    }
}
