//! Binds engine start and stop around named units of work.
//!
//! The binder starts the supervisor before the first unit in dependency order
//! and stops it exactly once after the last unit has finished, whether the
//! units succeeded, failed, or panicked. A failed start skips every unit and
//! becomes the run's failure; a failed unit stays the run's failure even when
//! shutdown later reports an error.

use std::collections::{BTreeSet, HashSet};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use cradle_config::EffectiveConfig;

use crate::engine::Engine;
use crate::publisher::PublishedFacts;
use crate::reporter::LIFECYCLE_TARGET;
use crate::supervisor::{ProcessSupervisor, StartError, StopReport};

type Action = Box<dyn FnMut(&PublishedFacts) -> Result<(), TaskError> + Send>;

/// Failure reported by a unit of work.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TaskError {
    message: String,
    exit_code: Option<i32>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TaskError {
    /// Failure described by `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            source: None,
        }
    }

    /// Attaches the exit code of the process that failed.
    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Human-readable failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Exit code of the failing process, when there was one.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// A named unit of work run while the engine is up.
pub struct UnitOfWork {
    name: String,
    dependencies: Vec<String>,
    action: Action,
}

impl UnitOfWork {
    /// Unit called `name` that runs `action` with the published facts.
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut(&PublishedFacts) -> Result<(), TaskError> + Send + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            action: Box::new(action),
        }
    }

    /// Requires `name` to run, and succeed, before this unit.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names this unit depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UnitOfWork")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Why a unit did not run.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The engine failed to start.
    StartFailed(Arc<StartError>),
    /// A dependency failed or was skipped.
    DependencyFailed {
        /// Name of the dependency.
        dependency: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFailed(error) => write!(formatter, "engine failed to start: {error}"),
            Self::DependencyFailed { dependency } => {
                write!(formatter, "dependency '{dependency}' did not succeed")
            }
        }
    }
}

/// Outcome of one unit.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The unit ran and succeeded.
    Succeeded,
    /// The unit ran and failed.
    Failed(Arc<TaskError>),
    /// The unit did not run.
    Skipped(SkipReason),
}

impl TaskOutcome {
    /// Returns `true` for [`TaskOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Problems with the set of bound units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Two units share a name.
    #[error("unit '{name}' is already bound")]
    DuplicateUnit {
        /// Repeated name.
        name: String,
    },
    /// A unit depends on a name that was never bound.
    #[error("unit '{unit}' depends on unknown unit '{dependency}'")]
    UnknownDependency {
        /// Dependent unit.
        unit: String,
        /// Missing dependency.
        dependency: String,
    },
    /// Dependencies form a cycle.
    #[error("dependency cycle between units: {}", units.join(", "))]
    Cycle {
        /// Units that could not be ordered.
        units: Vec<String>,
    },
}

/// The failure that decides a run's result.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// Units could not be ordered; nothing started.
    #[error(transparent)]
    Bind(#[from] BindError),
    /// The engine failed to start; no unit ran.
    #[error("engine failed to start: {0}")]
    Start(#[source] Arc<StartError>),
    /// A unit failed.
    #[error("unit '{unit}' failed: {source}")]
    Task {
        /// Name of the first failing unit.
        unit: String,
        /// Its failure.
        #[source]
        source: Arc<TaskError>,
    },
}

/// Everything that happened during [`LifecycleBinder::run`].
#[derive(Debug)]
pub struct RunReport {
    outcomes: Vec<(String, TaskOutcome)>,
    failure: Option<RunError>,
    stop: StopReport,
}

impl RunReport {
    /// Outcomes in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, TaskOutcome)] {
        &self.outcomes
    }

    /// Outcome of the unit called `name`.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(unit, _)| unit == name)
            .map(|(_, outcome)| outcome)
    }

    /// Result of the stop hook. Never affects [`Self::result`].
    #[must_use]
    pub const fn stop(&self) -> &StopReport {
        &self.stop
    }

    /// Returns `true` when every unit succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The run's overall result.
    ///
    /// # Errors
    ///
    /// Returns the bind error, the start failure, or the first unit failure.
    pub fn result(&self) -> Result<(), RunError> {
        self.failure.clone().map_or(Ok(()), Err)
    }
}

/// Stops the supervisor once, on the normal path or while unwinding.
struct StopGuard<'a, E> {
    supervisor: &'a mut ProcessSupervisor<E>,
    stopped: bool,
}

impl<'a, E> StopGuard<'a, E> {
    const fn new(supervisor: &'a mut ProcessSupervisor<E>) -> Self {
        Self {
            supervisor,
            stopped: false,
        }
    }

    fn finish(mut self) -> StopReport {
        self.stopped = true;
        self.supervisor.stop()
    }
}

impl<E> Drop for StopGuard<'_, E> {
    fn drop(&mut self) {
        if !self.stopped {
            let _report = self.supervisor.stop();
        }
    }
}

/// Runs bound units between supervisor start and stop.
#[derive(Debug, Default)]
pub struct LifecycleBinder {
    units: Vec<UnitOfWork>,
}

impl LifecycleBinder {
    /// Empty binder.
    #[must_use]
    pub const fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Registers `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateUnit`] when the name is already bound.
    pub fn bind(&mut self, unit: UnitOfWork) -> Result<(), BindError> {
        if self.units.iter().any(|bound| bound.name == unit.name) {
            return Err(BindError::DuplicateUnit { name: unit.name });
        }
        self.units.push(unit);
        Ok(())
    }

    /// Number of bound units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` when no unit is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit names in execution order. Independent units keep their binding
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnknownDependency`] or [`BindError::Cycle`].
    pub fn order(&self) -> Result<Vec<&str>, BindError> {
        Ok(self
            .ordered_indices()?
            .into_iter()
            .filter_map(|index| self.units.get(index))
            .map(|unit| unit.name.as_str())
            .collect())
    }

    fn ordered_indices(&self) -> Result<Vec<usize>, BindError> {
        for unit in &self.units {
            if let Some(dependency) = unit
                .dependencies
                .iter()
                .find(|name| !self.units.iter().any(|bound| &bound.name == *name))
            {
                return Err(BindError::UnknownDependency {
                    unit: unit.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut remaining: Vec<(usize, &UnitOfWork)> = self.units.iter().enumerate().collect();
        let mut order = Vec::with_capacity(self.units.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|(_, unit)| {
                unit.dependencies
                    .iter()
                    .all(|dependency| placed.contains(dependency.as_str()))
            });
            let Some(position) = ready else {
                let units: BTreeSet<String> =
                    remaining.iter().map(|(_, unit)| unit.name.clone()).collect();
                return Err(BindError::Cycle {
                    units: units.into_iter().collect(),
                });
            };
            let (index, unit) = remaining.remove(position);
            placed.insert(unit.name.as_str());
            order.push(index);
        }
        Ok(order)
    }

    /// Mutable views of the units at `order`, in that order.
    fn units_in(&mut self, order: &[usize]) -> Vec<&mut UnitOfWork> {
        let mut slots: Vec<Option<&mut UnitOfWork>> = self.units.iter_mut().map(Some).collect();
        order
            .iter()
            .filter_map(|&index| slots.get_mut(index).and_then(Option::take))
            .collect()
    }

    /// Starts the engine, runs every unit in order, and stops the engine.
    ///
    /// A supervisor that is already running is reused rather than
    /// restarted. The supervisor is stopped exactly once on every path,
    /// including a panicking unit.
    pub fn run<E: Engine>(
        &mut self,
        supervisor: &mut ProcessSupervisor<E>,
        config: EffectiveConfig,
    ) -> RunReport {
        let order = match self.ordered_indices() {
            Ok(order) => order,
            Err(error) => {
                return RunReport {
                    outcomes: Vec::new(),
                    failure: Some(error.into()),
                    stop: StopReport::noop(),
                };
            }
        };
        if order.is_empty() {
            debug!(target: LIFECYCLE_TARGET, "no units bound; engine not started");
            return RunReport {
                outcomes: Vec::new(),
                failure: None,
                stop: StopReport::noop(),
            };
        }

        let reporter = Arc::clone(supervisor.reporter());
        let mut guard = StopGuard::new(supervisor);
        let facts = match guard.supervisor.start(config) {
            Ok(handle) => PublishedFacts::from_handle(handle),
            Err(error) => {
                let error = Arc::new(error);
                let outcomes = order
                    .iter()
                    .filter_map(|&index| self.units.get(index))
                    .map(|unit| {
                        let name = unit.name.clone();
                        let outcome =
                            TaskOutcome::Skipped(SkipReason::StartFailed(Arc::clone(&error)));
                        reporter.unit_finished(&name, &outcome);
                        (name, outcome)
                    })
                    .collect();
                let stop = guard.finish();
                return RunReport {
                    outcomes,
                    failure: Some(RunError::Start(error)),
                    stop,
                };
            }
        };

        let mut outcomes = Vec::with_capacity(order.len());
        let mut unsuccessful: HashSet<String> = HashSet::new();
        let mut failure = None;
        for unit in self.units_in(&order) {
            let blocked = unit
                .dependencies
                .iter()
                .find(|dependency| unsuccessful.contains(*dependency))
                .cloned();
            let outcome = match blocked {
                Some(dependency) => {
                    TaskOutcome::Skipped(SkipReason::DependencyFailed { dependency })
                }
                None => {
                    info!(target: LIFECYCLE_TARGET, unit = %unit.name, "running unit of work");
                    match (unit.action)(&facts) {
                        Ok(()) => TaskOutcome::Succeeded,
                        Err(error) => TaskOutcome::Failed(Arc::new(error)),
                    }
                }
            };
            if let TaskOutcome::Failed(error) = &outcome
                && failure.is_none()
            {
                failure = Some(RunError::Task {
                    unit: unit.name.clone(),
                    source: Arc::clone(error),
                });
            }
            if !outcome.is_success() {
                unsuccessful.insert(unit.name.clone());
            }
            reporter.unit_finished(&unit.name, &outcome);
            outcomes.push((unit.name.clone(), outcome));
        }

        let stop = guard.finish();
        RunReport {
            outcomes,
            failure,
            stop,
        }
    }
}
