//! Structured reporting for engine lifecycle events.

use std::path::Path;
use std::sync::Arc;

use crate::binder::TaskOutcome;
use crate::supervisor::{ManagedProcessHandle, StartError, StopReport};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked before an engine is launched.
    fn engine_starting(&self, working_directory: &Path);

    /// Invoked once the engine accepts connections.
    fn engine_ready(&self, handle: &ManagedProcessHandle);

    /// Invoked when a start attempt fails.
    fn engine_failed(&self, error: &StartError);

    /// Invoked before an engine is stopped.
    fn engine_stopping(&self, working_directory: &Path, was_running: bool);

    /// Invoked after an engine stopped, cleanly or not.
    fn engine_stopped(&self, report: &StopReport);

    /// Invoked when a bound unit of work finishes or is skipped.
    fn unit_finished(&self, name: &str, outcome: &TaskOutcome);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn engine_starting(&self, working_directory: &Path) {
        (**self).engine_starting(working_directory);
    }

    fn engine_ready(&self, handle: &ManagedProcessHandle) {
        (**self).engine_ready(handle);
    }

    fn engine_failed(&self, error: &StartError) {
        (**self).engine_failed(error);
    }

    fn engine_stopping(&self, working_directory: &Path, was_running: bool) {
        (**self).engine_stopping(working_directory, was_running);
    }

    fn engine_stopped(&self, report: &StopReport) {
        (**self).engine_stopped(report);
    }

    fn unit_finished(&self, name: &str, outcome: &TaskOutcome) {
        (**self).unit_finished(name, outcome);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn engine_starting(&self, working_directory: &Path) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "engine_starting",
            dir = %working_directory.display(),
            "Starting Cassandra in {}",
            working_directory.display()
        );
    }

    fn engine_ready(&self, handle: &ManagedProcessHandle) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "engine_ready",
            instance = handle.id(),
            pid = ?handle.pid(),
            ports = ?handle.ports(),
            "engine ready"
        );
    }

    fn engine_failed(&self, error: &StartError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "engine_failed",
            error = %error,
            "engine failed to start"
        );
    }

    fn engine_stopping(&self, working_directory: &Path, was_running: bool) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "engine_stopping",
            dir = %working_directory.display(),
            running = was_running,
            "Stopping Cassandra in {} (is running: {})",
            working_directory.display(),
            if was_running { "yes" } else { "no" }
        );
    }

    fn engine_stopped(&self, report: &StopReport) {
        match report.error() {
            Some(error) => tracing::warn!(
                target: LIFECYCLE_TARGET,
                event = "engine_stopped",
                error = %error,
                "engine stop reported an error"
            ),
            None => tracing::info!(
                target: LIFECYCLE_TARGET,
                event = "engine_stopped",
                "engine stopped"
            ),
        }
    }

    fn unit_finished(&self, name: &str, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => tracing::info!(
                target: LIFECYCLE_TARGET,
                event = "unit_succeeded",
                unit = name,
                "unit of work succeeded"
            ),
            TaskOutcome::Failed(error) => tracing::error!(
                target: LIFECYCLE_TARGET,
                event = "unit_failed",
                unit = name,
                error = %error,
                "unit of work failed"
            ),
            TaskOutcome::Skipped(reason) => tracing::warn!(
                target: LIFECYCLE_TARGET,
                event = "unit_skipped",
                unit = name,
                reason = %reason,
                "unit of work skipped"
            ),
        }
    }
}
