//! Shared doubles and builders for the cradle test suites.

mod engine;
mod reporter;

use std::sync::Arc;
use std::time::Duration;

use cradle_config::{EffectiveConfig, EngineSettings, resolve};
use tempfile::TempDir;

use crate::autofix::{RuntimeVersion, StaticRuntimeProbe};
use crate::publisher::FactBoard;
use crate::supervisor::ProcessSupervisor;

pub use engine::{FakeBehaviour, FakeEngine};
pub use reporter::{LifecycleEvent, RecordingLifecycleReporter};

/// Readiness budget used by doubles that should come up immediately.
pub const TEST_STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings rooted in `dir` with auto-fix disabled and random ports.
#[must_use]
pub fn overrides_in(dir: &TempDir) -> EngineSettings {
    let mut overrides = EngineSettings::empty();
    overrides
        .working_directory(dir.path().join("cassandra"))
        .auto_fix(false)
        .startup_timeout(TEST_STARTUP_TIMEOUT);
    overrides
}

/// Resolves the baseline defaults against `overrides`.
#[must_use]
pub fn resolve_with(overrides: &EngineSettings) -> EffectiveConfig {
    resolve(&EngineSettings::baseline(), overrides).expect("resolve test settings")
}

/// Runtime every supervisor double reports, so no `java` is spawned.
pub const TEST_RUNTIME: RuntimeVersion = RuntimeVersion::new(11);

/// Supervisor over `engine` on the process-wide board, reporting to
/// `reporter`.
#[must_use]
pub fn shared_supervisor_for(
    engine: FakeEngine,
    reporter: Arc<RecordingLifecycleReporter>,
) -> ProcessSupervisor<FakeEngine> {
    ProcessSupervisor::new(engine)
        .with_reporter(reporter)
        .with_runtime_probe(StaticRuntimeProbe(TEST_RUNTIME))
        .with_shutdown_grace(Duration::from_millis(200))
}

/// Supervisor over `engine` reporting to `reporter` with a private board.
#[must_use]
pub fn supervisor_for(
    engine: FakeEngine,
    reporter: Arc<RecordingLifecycleReporter>,
) -> ProcessSupervisor<FakeEngine> {
    shared_supervisor_for(engine, reporter).with_fact_board(FactBoard::isolated())
}
