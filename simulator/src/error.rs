use crate::mutation::MutationError;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Errors raised by the simulator. Per-message failures are recovered
/// locally (logged, dropped, recorded in the error cell); configuration
/// and startup failures are fatal.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed inbound frame; the offending message is dropped without
    /// terminating the session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Pending queue overflow at depth {depth}")]
    QueueOverflow { depth: usize },

    #[error("Exit session not logged on")]
    ExitNotLoggedOn,

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Result type alias for simulator operations
pub type SimResult<T> = Result<T, SimulatorError>;

/// First-fatal-wins error cell. The first recorded error latches;
/// later ones are logged only. `is_ready` reports false while latched.
#[derive(Default)]
pub struct ErrorCell {
    inner: Mutex<Option<SimulatorError>>,
}

impl ErrorCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: SimulatorError) {
        let mut slot = self.inner.lock();
        match slot.as_ref() {
            None => {
                warn!(error = %error, "Latched simulator error");
                *slot = Some(error);
            }
            Some(first) => {
                warn!(error = %error, first = %first, "Suppressed simulator error");
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Render the latched error, if any.
    pub fn describe(&self) -> Option<String> {
        self.inner.lock().as_ref().map(SimulatorError::to_string)
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

impl fmt::Debug for ErrorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCell")
            .field("error", &self.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let cell = ErrorCell::new();
        assert!(!cell.is_set());
        cell.record(SimulatorError::ExitNotLoggedOn);
        cell.record(SimulatorError::QueueOverflow { depth: 4 });
        assert!(cell.is_set());
        assert_eq!(cell.describe().unwrap(), "Exit session not logged on");
    }

    #[test]
    fn test_clear_resets() {
        let cell = ErrorCell::new();
        cell.record(SimulatorError::ExitNotLoggedOn);
        cell.clear();
        assert!(!cell.is_set());
    }
}
