//! Priority table for well-known manager kinds.
//!
//! Interpreter-path resolution probes managers in a fixed order so that,
//! when several managers could plausibly claim a path, the most specific
//! tool wins (pyenv shims before plain venvs, venvs before the system
//! interpreter). Managers outside this table sort after it.

/// Well-known environment manager kinds, declared in resolution
/// priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KnownManagerKind {
    Pyenv,
    Pixi,
    Conda,
    Pipenv,
    Poetry,
    ActiveState,
    Hatch,
    Venv,
    System,
}

impl KnownManagerKind {
    /// Parse from a manager's short name (the part after the namespace).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pyenv" => Some(KnownManagerKind::Pyenv),
            "pixi" => Some(KnownManagerKind::Pixi),
            "conda" => Some(KnownManagerKind::Conda),
            "pipenv" => Some(KnownManagerKind::Pipenv),
            "poetry" => Some(KnownManagerKind::Poetry),
            "activestate" => Some(KnownManagerKind::ActiveState),
            "hatch" => Some(KnownManagerKind::Hatch),
            "venv" => Some(KnownManagerKind::Venv),
            "system" => Some(KnownManagerKind::System),
            _ => None,
        }
    }

    /// Position in the fixed priority order; lower wins.
    pub fn priority(self) -> usize {
        self as usize
    }
}

/// Priority rank for an arbitrary manager id (`namespace:name`).
///
/// Known kinds keep their table position; unknown kinds all rank last
/// and their relative order is unspecified.
pub fn priority_rank(manager_id: &str) -> usize {
    let name = manager_id.rsplit(':').next().unwrap_or(manager_id);
    KnownManagerKind::from_name(name)
        .map(KnownManagerKind::priority)
        .unwrap_or(usize::MAX)
}
