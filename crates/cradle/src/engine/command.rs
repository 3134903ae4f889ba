//! Engine launched as an external command.
//!
//! The binary runs in the foreground (`-f`) from the instance working
//! directory. JVM flags and system properties travel through `JVM_OPTS`, the
//! rendered configuration file through `-Dcassandra.config`, and output is
//! captured in `cassandra.log` inside the working directory.

use std::ffi::OsString;
use std::fs::File;
use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info};

use cradle_config::DEFAULT_ENGINE_BINARY;

use super::conf::write_engine_config;
use super::errors::{EngineLaunchError, ShutdownError};
use super::probe::endpoint_is_reachable;
use super::{Engine, EngineProcess, LaunchPlan, Readiness};

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

const ENGINE_LOG_FILE: &str = "cassandra.log";
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Launches the engine binary as a child process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    binary: OsString,
    leading_args: Vec<OsString>,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_BINARY)
    }
}

impl CommandEngine {
    /// Engine that runs `binary`, resolved through `PATH` when relative.
    #[must_use]
    pub fn new(binary: impl Into<OsString>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
        }
    }

    /// Adds an argument placed before the foreground flag, such as a script
    /// path when `binary` is an interpreter.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Binary being launched.
    #[must_use]
    pub fn binary(&self) -> &OsString {
        &self.binary
    }
}

impl Engine for CommandEngine {
    fn launch(&self, plan: &LaunchPlan) -> Result<Box<dyn EngineProcess>, EngineLaunchError> {
        let config_path = write_engine_config(plan)?;
        let log_path = plan.working_directory().join(ENGINE_LOG_FILE);
        let stdout = File::create(&log_path).map_err(|source| EngineLaunchError::Prepare {
            path: log_path.clone(),
            source,
        })?;
        let stderr = stdout
            .try_clone()
            .map_err(|source| EngineLaunchError::Prepare {
                path: log_path.clone(),
                source,
            })?;

        let mut jvm_opts = plan.jvm_options().to_vec();
        jvm_opts.push(format!("-Dcassandra.config=file://{}", config_path.display()));
        for (key, value) in plan.system_properties() {
            jvm_opts.push(format!("-D{key}={value}"));
        }

        let mut command = Command::new(&self.binary);
        command
            .args(&self.leading_args)
            .arg("-f")
            .current_dir(plan.working_directory())
            .env("JVM_OPTS", jvm_opts.join(" "))
            .env("CASSANDRA_LOG_DIR", plan.working_directory().join("logs"))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        debug!(
            target: ENGINE_TARGET,
            binary = ?self.binary,
            jvm_opts = %jvm_opts.join(" "),
            config = %config_path.display(),
            "spawning engine"
        );
        let child = command
            .spawn()
            .map_err(|source| EngineLaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        info!(
            target: ENGINE_TARGET,
            pid = child.id(),
            log = %log_path.display(),
            "engine process spawned"
        );
        Ok(Box::new(CommandProcess::new(
            child,
            plan.readiness_endpoint(),
        )))
    }
}

/// A running engine child process.
#[derive(Debug)]
pub struct CommandProcess {
    child: Child,
    endpoint: SocketAddr,
    exited: bool,
}

impl CommandProcess {
    /// Wraps a spawned child that serves clients on `endpoint`.
    #[must_use]
    pub const fn new(child: Child, endpoint: SocketAddr) -> Self {
        Self {
            child,
            endpoint,
            exited: false,
        }
    }

    fn send_signal(&self, signal: Signal) -> Result<(), ShutdownError> {
        let pid = self.child.id();
        let raw = i32::try_from(pid).map_err(|_| ShutdownError::Signal {
            pid,
            source: nix::errno::Errno::ESRCH,
        })?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(source) => Err(ShutdownError::Signal { pid, source }),
        }
    }

    /// Waits for exit until `deadline`, or indefinitely when there is none.
    fn wait_until(&mut self, deadline: Option<Instant>) -> Result<bool, ShutdownError> {
        let pid = self.child.id();
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => {
                    self.exited = true;
                    return Ok(true);
                }
                Ok(None) if deadline.is_some_and(|deadline| Instant::now() >= deadline) => {
                    return Ok(false);
                }
                Ok(None) => thread::sleep(SHUTDOWN_POLL_INTERVAL),
                Err(source) => return Err(ShutdownError::Wait { pid, source }),
            }
        }
    }
}

impl EngineProcess for CommandProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn poll_ready(&mut self) -> Result<Readiness, EngineLaunchError> {
        if let Some(status) = self
            .child
            .try_wait()
            .map_err(|source| EngineLaunchError::Monitor { source })?
        {
            self.exited = true;
            return Err(EngineLaunchError::Exited {
                status: status.code(),
            });
        }
        match endpoint_is_reachable(self.endpoint) {
            Ok(true) => Ok(Readiness::Ready),
            Ok(false) => Ok(Readiness::Pending),
            Err(source) => Err(EngineLaunchError::Readiness {
                endpoint: self.endpoint,
                source,
            }),
        }
    }

    fn is_running(&mut self) -> bool {
        if self.exited {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    fn shutdown(&mut self, grace: Duration) -> Result<(), ShutdownError> {
        if !self.is_running() {
            return Ok(());
        }
        let pid = self.child.id();
        self.send_signal(Signal::SIGTERM)?;
        if self.wait_until(Instant::now().checked_add(grace))? {
            return Ok(());
        }
        self.send_signal(Signal::SIGKILL)?;
        self.child
            .wait()
            .map_err(|source| ShutdownError::Wait { pid, source })?;
        self.exited = true;
        Err(ShutdownError::Timeout {
            pid,
            timeout: grace,
        })
    }
}

impl Drop for CommandProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use cradle_config::{EngineSettings, PortName, resolve};
    use tempfile::TempDir;

    use crate::ports::{HostScope, PortAllocator};

    // Run through the interpreter so a freshly written file is never exec'd.
    fn script(dir: &Path, body: &str) -> CommandEngine {
        let path = dir.join("fake-engine.sh");
        fs::write(&path, format!("{body}\n")).expect("write script");
        CommandEngine::new("/bin/sh").with_arg(path)
    }

    fn plan_in(dir: &Path) -> LaunchPlan {
        let mut overrides = EngineSettings::empty();
        overrides
            .working_directory(dir.join("cassandra"))
            .auto_fix(false)
            .system_property("cassandra.load_ring_state", false);
        let config = resolve(&EngineSettings::baseline(), &overrides).expect("resolve");
        let explicit: BTreeMap<PortName, Option<u16>> = config.explicit_ports().clone();
        let ports = PortAllocator::new()
            .allocate(&explicit, HostScope::loopback())
            .expect("allocate");
        LaunchPlan::new(&config, ports, HostScope::loopback(), vec!["-Xmx256m".into()])
    }

    #[test]
    fn exit_before_ready_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let engine = script(dir.path(), "exit 3");
        let mut process = engine.launch(&plan_in(dir.path())).expect("launch");

        let deadline = Instant::now() + Duration::from_secs(5);
        let error = loop {
            match process.poll_ready() {
                Err(error) => break error,
                Ok(_) if Instant::now() >= deadline => panic!("script never exited"),
                Ok(_) => thread::sleep(Duration::from_millis(20)),
            }
        };
        assert!(matches!(error, EngineLaunchError::Exited { status: Some(3) }));
        assert!(!process.is_running());
    }

    #[test]
    fn engine_receives_jvm_opts_and_config() {
        let dir = TempDir::new().expect("temp dir");
        let engine = script(
            dir.path(),
            "printf '%s\\n' \"$JVM_OPTS\" > jvm_opts.tmp\nmv jvm_opts.tmp jvm_opts.txt\nexec sleep 30",
        );
        let plan = plan_in(dir.path());
        let mut process = engine.launch(&plan).expect("launch");

        let opts_path = plan.working_directory().join("jvm_opts.txt");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !opts_path.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        let opts = fs::read_to_string(&opts_path).expect("read jvm opts");
        assert!(opts.contains("-Xmx256m"));
        assert!(opts.contains("-Dcassandra.load_ring_state=false"));
        assert!(opts.contains("-Dcassandra.superuser_setup_delay_ms=0"));
        assert!(opts.contains("cassandra.yaml"));

        assert!(process.is_running());
        process
            .shutdown(Duration::from_secs(5))
            .expect("sleep honours SIGTERM");
        assert!(!process.is_running());
    }

    #[test]
    fn unbounded_grace_waits_for_a_clean_exit() {
        let dir = TempDir::new().expect("temp dir");
        let engine = script(dir.path(), "exec sleep 30");
        let mut process = engine.launch(&plan_in(dir.path())).expect("launch");

        process
            .shutdown(Duration::MAX)
            .expect("sleep honours SIGTERM");
        assert!(!process.is_running());
    }

    #[test]
    fn stubborn_engine_is_killed_after_grace() {
        let dir = TempDir::new().expect("temp dir");
        let engine = script(
            dir.path(),
            "trap '' TERM\ntouch trapped\nwhile true; do sleep 1; done",
        );
        let plan = plan_in(dir.path());
        let mut process = engine.launch(&plan).expect("launch");
        let marker = plan.working_directory().join("trapped");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        let error = process
            .shutdown(Duration::from_millis(300))
            .expect_err("forced shutdown is reported");
        assert!(matches!(error, ShutdownError::Timeout { .. }));
        assert!(!process.is_running());
    }

    #[test]
    fn missing_binary_fails_to_spawn() {
        let dir = TempDir::new().expect("temp dir");
        let engine = CommandEngine::new("/nonexistent/cradle/cassandra");
        let error = engine
            .launch(&plan_in(dir.path()))
            .err()
            .expect("spawn must fail");
        match error {
            EngineLaunchError::Spawn { binary, .. } => {
                assert_eq!(binary, OsString::from("/nonexistent/cradle/cassandra"));
            }
            other => panic!("expected Spawn, got: {other:?}"),
        }
    }
}
