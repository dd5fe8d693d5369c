//! Task identity and the error type task bodies report.

use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Unique identifier of a scheduled task.
///
/// Handles are assigned monotonically and never reused while the process
/// runs, so a stale handle can never address a newer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value, for diagnostics.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one task body invocation.
pub type TaskResult = Result<(), TaskError>;

/// Failure escaping a task body.
///
/// The scheduler catches these at the execution boundary and reports them
/// through the logging router; they never propagate into the loop. The
/// optional source preserves the underlying error chain for the report.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + 'static>>,
}

impl TaskError {
    /// A failure described by a message alone.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// A failure wrapping an underlying error.
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Error + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The failure message without the source chain.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
