//! Test double for [`LifecycleReporter`] that records events for assertions.

use std::path::Path;
use std::sync::Mutex;

use crate::binder::TaskOutcome;
use crate::reporter::LifecycleReporter;
use crate::supervisor::{ManagedProcessHandle, StartError, StopReport};

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Starting,
    Ready,
    Failed(String),
    Stopping { was_running: bool },
    Stopped { clean: bool },
    UnitSucceeded(String),
    UnitFailed(String),
    UnitSkipped(String),
}

/// Records lifecycle events.
#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .clone()
    }

    /// Counts recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn engine_starting(&self, _working_directory: &Path) {
        self.record(LifecycleEvent::Starting);
    }

    fn engine_ready(&self, _handle: &ManagedProcessHandle) {
        self.record(LifecycleEvent::Ready);
    }

    fn engine_failed(&self, error: &StartError) {
        self.record(LifecycleEvent::Failed(error.to_string()));
    }

    fn engine_stopping(&self, _working_directory: &Path, was_running: bool) {
        self.record(LifecycleEvent::Stopping { was_running });
    }

    fn engine_stopped(&self, report: &StopReport) {
        self.record(LifecycleEvent::Stopped {
            clean: report.is_clean(),
        });
    }

    fn unit_finished(&self, name: &str, outcome: &TaskOutcome) {
        let name = name.to_owned();
        self.record(match outcome {
            TaskOutcome::Succeeded => LifecycleEvent::UnitSucceeded(name),
            TaskOutcome::Failed(_) => LifecycleEvent::UnitFailed(name),
            TaskOutcome::Skipped(_) => LifecycleEvent::UnitSkipped(name),
        });
    }
}
