// ABOUTME: Error types for registry, event dispatch and module loading
// ABOUTME: Structural errors are returned synchronously; handler failures surface from send_event

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// A name is already registered in this node
    #[error("Name conflict: '{0}' is already registered")]
    NameConflict(String),

    /// A path segment is missing, is not a node, or holds another type
    #[error("Lookup failed for '{path}': {reason}")]
    Lookup { path: String, reason: &'static str },

    /// Malformed handler parameter declaration
    #[error("Invalid handler signature: {0}")]
    Signature(String),

    /// A module was added before the names it depends on
    #[error("Module '{module}' inject not satisfied, missing: {}", missing.join(", "))]
    InjectionUnsatisfied {
        module: String,
        missing: Vec<String>,
    },

    /// A module's `apply` failed
    #[error("Module '{module}' failed to apply: {source}")]
    ModuleApply {
        module: String,
        #[source]
        source: crate::Error,
    },

    /// An event handler returned an error
    #[error("Event handler failed: {0}")]
    HandlerFailed(#[source] crate::Error),

    /// An event handler task panicked or was aborted
    #[error("Event handler task did not complete: {0}")]
    HandlerPanicked(String),
}

impl BusError {
    pub(crate) fn lookup(path: impl Into<String>, reason: &'static str) -> Self {
        BusError::Lookup {
            path: path.into(),
            reason,
        }
    }
}

/// Result type alias for bus operations
pub type BusResult<T> = Result<T, BusError>;
