//! Environment identity and execution metadata.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of an environment: the id of the manager that owns it plus
/// the manager's own id for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId {
    /// Fully qualified manager id (`namespace:name`).
    pub manager_id: String,
    /// Manager-assigned environment id, unique within that manager.
    pub id: String,
}

impl EnvironmentId {
    pub fn new(manager_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.manager_id, self.id)
    }
}

/// An executable plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl ExecSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(executable: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Render as a single shell-ready command line.
    ///
    /// Arguments containing whitespace are double-quoted; anything more
    /// exotic is the backend's responsibility to pre-quote.
    pub fn command_line(&self) -> String {
        let mut line = self.executable.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            if arg.chars().any(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// How to run (and activate) an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecInfo {
    /// Default interpreter invocation.
    pub run: ExecSpec,
    /// Invocation to prefer once shell activation has occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_run: Option<ExecSpec>,
    /// Ordered commands that activate the environment in a shell.
    #[serde(default)]
    pub activation: Vec<ExecSpec>,
}

impl ExecInfo {
    pub fn new(run: ExecSpec) -> Self {
        Self {
            run,
            activated_run: None,
            activation: Vec::new(),
        }
    }
}

/// A concrete Python environment produced by a manager.
///
/// Identity is `env_id`: two records with the same `env_id` describe the
/// same environment even when display metadata differs, so structural
/// equality is intentionally not derived. Compare with
/// [`PythonEnvironment::same_environment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonEnvironment {
    pub env_id: EnvironmentId,
    pub display_name: String,
    /// Interpreter version as reported by the manager (e.g. "3.12.1").
    pub version: String,
    pub exec_info: ExecInfo,
}

impl PythonEnvironment {
    /// Identity comparison by `env_id` only.
    pub fn same_environment(&self, other: &PythonEnvironment) -> bool {
        self.env_id == other.env_id
    }
}
