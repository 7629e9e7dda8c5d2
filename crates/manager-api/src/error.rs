//! Errors surfaced by manager backends.

/// Failure of a single backend operation.
///
/// `UnsupportedOperation` is the rejection backends return (via the
/// default trait methods) when asked for an optional capability they do
/// not implement; it is never a panic. Everything backend-specific flows
/// through the `Other` catch-all.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("{manager} does not support {operation}")]
    UnsupportedOperation {
        manager: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ManagerError {
    pub fn unsupported(manager: impl Into<String>, operation: &'static str) -> Self {
        ManagerError::UnsupportedOperation {
            manager: manager.into(),
            operation,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ManagerError::UnsupportedOperation { .. })
    }
}
