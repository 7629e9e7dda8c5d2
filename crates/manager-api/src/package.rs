//! Package identity and metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a package record: owning package manager plus the
/// manager's own id for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    /// Fully qualified package manager id (`namespace:name`).
    pub manager_id: String,
    /// Manager-assigned package id.
    pub id: String,
}

impl PackageId {
    pub fn new(manager_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.manager_id, self.id)
    }
}

/// A package installed in an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub pkg_id: PackageId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A package a manager can offer for installation (for managers that can
/// enumerate their installable set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
