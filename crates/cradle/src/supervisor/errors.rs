use thiserror::Error;

use crate::engine::{EngineLaunchError, ShutdownError, StartupTimeoutError};
use crate::ports::PortAllocationError;

use super::SupervisorState;

/// Errors raised by [`super::ProcessSupervisor::start`].
#[derive(Debug, Error)]
pub enum StartError {
    /// The supervisor already ran an engine and has not been cleaned up.
    #[error("supervisor is {state}; clean it up before starting again")]
    NotIdle {
        /// State the supervisor was in.
        state: SupervisorState,
    },
    /// Ports could not be allocated.
    #[error("failed to allocate ports: {source}")]
    Ports {
        /// Underlying allocation error.
        #[from]
        source: PortAllocationError,
    },
    /// The engine could not be launched or died while starting.
    #[error("failed to launch engine: {source}")]
    Launch {
        /// Underlying launch error.
        #[from]
        source: EngineLaunchError,
    },
    /// The engine did not become ready in time.
    #[error(transparent)]
    Timeout(#[from] StartupTimeoutError),
}

/// Outcome of a stop request.
///
/// Shutdown failures are recorded here and logged; they never fail the
/// caller.
#[derive(Debug, Default)]
pub struct StopReport {
    performed: bool,
    was_running: bool,
    error: Option<ShutdownError>,
}

impl StopReport {
    pub(crate) const fn noop() -> Self {
        Self {
            performed: false,
            was_running: false,
            error: None,
        }
    }

    pub(crate) const fn performed(was_running: bool, error: Option<ShutdownError>) -> Self {
        Self {
            performed: true,
            was_running,
            error,
        }
    }

    /// Returns `true` when the request acted on a live engine.
    #[must_use]
    pub const fn was_performed(&self) -> bool {
        self.performed
    }

    /// Returns `true` when the engine was serving clients when stopped.
    #[must_use]
    pub const fn was_running(&self) -> bool {
        self.was_running
    }

    /// Shutdown error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ShutdownError> {
        self.error.as_ref()
    }

    /// Returns `true` when no shutdown error was recorded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}
