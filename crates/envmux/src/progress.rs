//! Outward notification seam.
//!
//! Provides [`ActivationPhase`] events covering terminal activation and
//! an [`EventSink`] trait that embedders implement to route progress and
//! user-visible errors to their UI layer. [`LogSink`] is the log-only
//! default.

use serde::{Deserialize, Serialize};

/// Progress phases while activating a terminal for an environment.
///
/// Serializable so embedders can forward them over IPC untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ActivationPhase {
    /// Waiting for the shell to report integration support.
    AwaitingShellIntegration { terminal: String },
    /// Running one activation command through the shell-integration
    /// channel. `index` is 1-based.
    RunningCommand {
        command: String,
        index: usize,
        total: usize,
    },
    /// Timeout elapsed; falling back to literal text injection.
    LegacyFallback { terminal: String },
    /// Activation finished.
    Activated { environment: String },
}

/// Routes user-visible progress and errors to the embedding UI layer.
pub trait EventSink: Send + Sync {
    fn on_activation(&self, phase: ActivationPhase);

    /// Terminal failures the user should see (e.g. no manager claims an
    /// interpreter path).
    fn on_error(&self, message: &str);
}

/// Log-only sink.
pub struct LogSink;

impl EventSink for LogSink {
    fn on_activation(&self, phase: ActivationPhase) {
        match &phase {
            ActivationPhase::AwaitingShellIntegration { terminal } => {
                log::info!("[terminal] {terminal}: waiting for shell integration");
            }
            ActivationPhase::RunningCommand {
                command,
                index,
                total,
            } => {
                log::info!("[terminal] activation command {index}/{total}: {command}");
            }
            ActivationPhase::LegacyFallback { terminal } => {
                log::info!("[terminal] {terminal}: no shell integration, using legacy activation");
            }
            ActivationPhase::Activated { environment } => {
                log::info!("[terminal] activated {environment}");
            }
        }
    }

    fn on_error(&self, message: &str) {
        log::error!("[envmux] {message}");
    }
}
