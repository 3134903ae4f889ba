//! Lifecycle state machine for one managed engine.
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Stopped
//!            |           |
//!            +-> Failed <+
//! ```
//!
//! Starting a live supervisor returns the existing handle. A supervisor that
//! has stopped or failed refuses new starts until [`ProcessSupervisor::cleanup`]
//! returns it to `Idle`. Stopping never fails: shutdown errors are recorded in
//! the [`StopReport`] and logged.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use cradle_config::EffectiveConfig;

use crate::autofix::{AutoFixPolicy, Cassandra4Policy, JavaRuntimeProbe, RuntimeProbe};
use crate::engine::{
    Engine, EngineLaunchError, EngineProcess, LaunchPlan, Readiness, StartupTimeoutError,
};
use crate::ports::{HostScope, PortAllocator};
use crate::publisher::{FactBoard, PropertyPublisher, PublishedFacts};
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};

mod errors;
mod handle;

pub use errors::{StartError, StopReport};
pub use handle::{ManagedProcessHandle, SupervisorState};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Interval between readiness polls.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Grace period between the termination request and a forced kill.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns at most one engine process and drives it through its lifecycle.
pub struct ProcessSupervisor<E> {
    engine: E,
    allocator: PortAllocator,
    scope: HostScope,
    policy: Box<dyn AutoFixPolicy>,
    runtime: Box<dyn RuntimeProbe>,
    reporter: Arc<dyn LifecycleReporter>,
    publisher: PropertyPublisher,
    shutdown_grace: Duration,
    state: SupervisorState,
    config: Option<Arc<EffectiveConfig>>,
    handle: Option<ManagedProcessHandle>,
    process: Option<Box<dyn EngineProcess>>,
}

impl<E> ProcessSupervisor<E> {
    /// Supervisor over `engine` with the Cassandra 4 auto-fix policy, a
    /// `java -version` runtime probe, loopback ports, and the process-wide
    /// fact board.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            allocator: PortAllocator::new(),
            scope: HostScope::loopback(),
            policy: Box::new(Cassandra4Policy),
            runtime: Box::new(JavaRuntimeProbe::new()),
            reporter: Arc::new(StructuredLifecycleReporter::new()),
            publisher: PropertyPublisher::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            state: SupervisorState::Idle,
            config: None,
            handle: None,
            process: None,
        }
    }

    /// Replaces the port allocator.
    #[must_use]
    pub fn with_allocator(mut self, allocator: PortAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Replaces the host scope ports are allocated on.
    #[must_use]
    pub fn with_scope(mut self, scope: HostScope) -> Self {
        self.scope = scope;
        self
    }

    /// Replaces the JVM auto-fix policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl AutoFixPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Replaces the runtime probe consulted by the auto-fix policy.
    #[must_use]
    pub fn with_runtime_probe(mut self, probe: impl RuntimeProbe + 'static) -> Self {
        self.runtime = Box::new(probe);
        self
    }

    /// Replaces the lifecycle reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Publishes facts to `board` instead of the process-wide board.
    #[must_use]
    pub fn with_fact_board(mut self, board: Arc<FactBoard>) -> Self {
        self.publisher = PropertyPublisher::new(board);
        self
    }

    /// Replaces the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Handle of the current or last instance.
    #[must_use]
    pub const fn handle(&self) -> Option<&ManagedProcessHandle> {
        self.handle.as_ref()
    }

    /// Facts published for the running instance.
    #[must_use]
    pub const fn published_facts(&self) -> Option<&PublishedFacts> {
        self.publisher.current()
    }

    /// Reporter receiving lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn LifecycleReporter> {
        &self.reporter
    }

    /// Stops the engine if one may be alive. Idempotent.
    pub fn stop(&mut self) -> StopReport {
        if !self.state.is_live() {
            debug!(
                target: SUPERVISOR_TARGET,
                state = %self.state,
                "stop requested with no live engine"
            );
            return StopReport::noop();
        }

        let was_running = self.state == SupervisorState::Running;
        if let Some(config) = &self.config {
            self.reporter
                .engine_stopping(config.working_directory(), was_running);
        }
        self.transition(SupervisorState::Stopping);
        self.publisher.retract();

        let error = self
            .process
            .take()
            .and_then(|mut process| process.shutdown(self.shutdown_grace).err());
        if let Some(error) = &error {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "engine shutdown reported an error"
            );
        }
        self.transition(SupervisorState::Stopped);

        let report = StopReport::performed(was_running, error);
        self.reporter.engine_stopped(&report);
        report
    }

    /// Stops any live engine, removes the working directory when the
    /// configuration asks for it, and returns the supervisor to `Idle`.
    pub fn cleanup(&mut self) -> StopReport {
        let report = self.stop();
        if let Some(config) = self.config.take()
            && config.cleanup_working_directory()
        {
            remove_working_directory(config.working_directory());
        }
        self.handle = None;
        self.state = SupervisorState::Idle;
        report
    }

    fn transition(&mut self, state: SupervisorState) {
        debug!(
            target: SUPERVISOR_TARGET,
            from = %self.state,
            to = %state,
            "supervisor state change"
        );
        self.state = state;
        if let Some(handle) = self.handle.as_mut() {
            handle.set_state(state);
        }
    }
}

impl<E: Engine> ProcessSupervisor<E> {
    /// Starts the engine and blocks until it is ready.
    ///
    /// A supervisor that is already starting or running returns its existing
    /// handle without launching anything.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::NotIdle`] after a stop or failure until
    /// [`Self::cleanup`] runs, and the underlying cause when allocation,
    /// launch, or readiness fails. Failures leave the supervisor `Failed`;
    /// there is no automatic retry.
    pub fn start(&mut self, config: EffectiveConfig) -> Result<&ManagedProcessHandle, StartError> {
        match self.state {
            SupervisorState::Starting | SupervisorState::Running => {
                debug!(
                    target: SUPERVISOR_TARGET,
                    state = %self.state,
                    "engine already started; reusing handle"
                );
            }
            SupervisorState::Idle => self.launch(config)?,
            state => return Err(StartError::NotIdle { state }),
        }
        self.handle.as_ref().ok_or(StartError::NotIdle { state: self.state })
    }

    fn launch(&mut self, config: EffectiveConfig) -> Result<(), StartError> {
        let config = Arc::new(config);
        self.config = Some(Arc::clone(&config));
        self.reporter.engine_starting(config.working_directory());
        self.transition(SupervisorState::Starting);

        match self.try_launch(&config) {
            Ok(()) => {
                self.transition(SupervisorState::Running);
                if let Some(handle) = self.handle.as_ref() {
                    self.publisher.publish(handle);
                    self.reporter.engine_ready(handle);
                }
                Ok(())
            }
            Err(error) => {
                self.transition(SupervisorState::Failed);
                self.reporter.engine_failed(&error);
                Err(error)
            }
        }
    }

    fn try_launch(&mut self, config: &Arc<EffectiveConfig>) -> Result<(), StartError> {
        let ports = self.allocator.allocate(config.explicit_ports(), self.scope)?;
        let jvm_options = self.jvm_options(config)?;
        fs::create_dir_all(config.working_directory()).map_err(|source| {
            EngineLaunchError::Prepare {
                path: config.working_directory().to_path_buf(),
                source,
            }
        })?;
        let plan = LaunchPlan::new(config, ports.clone(), self.scope, jvm_options);

        let process = self.engine.launch(&plan)?;
        info!(
            target: SUPERVISOR_TARGET,
            pid = ?process.pid(),
            endpoint = %plan.readiness_endpoint(),
            "engine launched; waiting for readiness"
        );
        self.handle = Some(ManagedProcessHandle::new(
            process.pid(),
            Arc::clone(config),
            ports,
            self.scope.host(),
        ));
        self.process = Some(process);
        self.wait_for_ready(&plan, config.startup_timeout())
    }

    fn jvm_options(&self, config: &EffectiveConfig) -> Result<Vec<String>, EngineLaunchError> {
        if config.auto_fix_enabled() {
            let runtime = self.runtime.detect()?;
            return Ok(self.policy.adjust(runtime, config.jvm_options())?);
        }
        // Flags pass through untouched, but a runtime that cannot host the
        // engine is still refused. An undetectable runtime is left to the
        // engine to report.
        match self.runtime.detect() {
            Ok(runtime) => self.policy.supports(runtime)?,
            Err(error) => debug!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "runtime version unknown; launching without a support check"
            ),
        }
        Ok(config.jvm_options().to_vec())
    }

    fn wait_for_ready(&mut self, plan: &LaunchPlan, timeout: Duration) -> Result<(), StartError> {
        // No deadline when the timeout lies beyond the clock's range.
        let deadline = Instant::now().checked_add(timeout);
        let Some(process) = self.process.as_mut() else {
            return Err(EngineLaunchError::Exited { status: None }.into());
        };
        loop {
            if process.poll_ready()? == Readiness::Ready {
                return Ok(());
            }
            let pause = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(StartupTimeoutError {
                            timeout,
                            probe: plan.readiness_endpoint().to_string(),
                        }
                        .into());
                    }
                    READINESS_POLL_INTERVAL.min(remaining)
                }
                None => READINESS_POLL_INTERVAL,
            };
            thread::sleep(pause);
        }
    }
}

impl<E> Drop for ProcessSupervisor<E> {
    fn drop(&mut self) {
        if self.state.is_live() {
            let _report = self.stop();
        }
    }
}

fn remove_working_directory(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => info!(
            target: SUPERVISOR_TARGET,
            dir = %path.display(),
            "working directory removed"
        ),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => warn!(
            target: SUPERVISOR_TARGET,
            dir = %path.display(),
            error = %error,
            "failed to remove working directory"
        ),
    }
}
