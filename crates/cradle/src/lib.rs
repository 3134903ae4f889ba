//! Lifecycle management for an ephemeral Cassandra engine.
//!
//! `cradle` starts an external engine process before a set of units of work,
//! exposes the ports and directories it was given, and guarantees it is
//! stopped afterwards whatever the units did. The pieces compose bottom up:
//!
//! - [`PortAllocator`] turns explicit port overrides and free ephemeral ports
//!   into a collision-free [`AllocatedPorts`] set.
//! - [`AutoFixPolicy`] adjusts JVM flags for the detected Java runtime.
//! - [`Engine`] launches the process; [`CommandEngine`] runs the real binary.
//! - [`ProcessSupervisor`] drives one engine through
//!   `Idle -> Starting -> Running -> Stopping -> Stopped`.
//! - [`PropertyPublisher`] exposes runtime facts while the engine runs.
//! - [`LifecycleBinder`] runs [`UnitOfWork`]s between start and stop.
//!
//! Configuration is resolved by [`cradle_config::resolve`] before anything
//! here is touched; lifecycle events flow to a [`LifecycleReporter`].

mod autofix;
mod binder;
mod engine;
mod ports;
mod publisher;
mod reporter;
mod supervisor;
pub mod telemetry;

pub use autofix::{
    AutoFixError, AutoFixPolicy, CASSANDRA4_JDK17_FLAGS, Cassandra4Policy, JavaRuntimeProbe,
    RuntimeProbe, RuntimeProbeError, RuntimeVersion, StaticRuntimeProbe,
};
pub use binder::{
    BindError, LifecycleBinder, RunError, RunReport, SkipReason, TaskError, TaskOutcome,
    UnitOfWork,
};
pub use engine::{
    CommandEngine, CommandProcess, ENGINE_CONFIG_FILE, Engine, EngineLaunchError, EngineProcess,
    LaunchPlan, Readiness, ShutdownError, StartupTimeoutError, endpoint_is_reachable,
    write_engine_config,
};
pub use ports::{
    AllocatedPorts, DEFAULT_ALLOCATION_ATTEMPTS, HostScope, PortAllocationError, PortAllocator,
};
pub use publisher::{
    FactBoard, HOST_FACT, PID_FACT, PropertyPublisher, PublishedFacts, WORKING_DIRECTORY_FACT,
    fact,
};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};
pub use supervisor::{
    DEFAULT_SHUTDOWN_GRACE, ManagedProcessHandle, ProcessSupervisor, READINESS_POLL_INTERVAL,
    StartError, StopReport, SupervisorState,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
