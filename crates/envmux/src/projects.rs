//! Project layout collaborator.
//!
//! The coordinator does not own workspace discovery; the embedder tells
//! it which project root a resource belongs to. Scope keys and
//! per-project assignments both hang off that answer.

use std::path::{Path, PathBuf};

/// Maps resources to their owning project.
pub trait ProjectLocator: Send + Sync {
    /// Root directory of the project that owns `resource`, if any.
    fn project_for(&self, resource: &Path) -> Option<PathBuf>;

    /// All known project roots. Used by whole-workspace refreshes;
    /// embedders without a project concept can leave this empty.
    fn projects(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Fixed list of project roots; the longest root that prefixes the
/// resource wins.
pub struct StaticProjects {
    roots: Vec<PathBuf>,
}

impl StaticProjects {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl ProjectLocator for StaticProjects {
    fn project_for(&self, resource: &Path) -> Option<PathBuf> {
        self.roots
            .iter()
            .filter(|root| resource.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    fn projects(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_root_wins() {
        let projects = StaticProjects::new(vec![
            PathBuf::from("/work"),
            PathBuf::from("/work/app"),
        ]);
        assert_eq!(
            projects.project_for(Path::new("/work/app/src/main.py")),
            Some(PathBuf::from("/work/app"))
        );
        assert_eq!(
            projects.project_for(Path::new("/work/tool.py")),
            Some(PathBuf::from("/work"))
        );
        assert_eq!(projects.project_for(Path::new("/elsewhere/x.py")), None);
    }
}
