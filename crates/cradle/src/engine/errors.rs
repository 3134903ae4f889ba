//! Error surface for launching, probing, and stopping engine processes.

use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

use crate::autofix::{AutoFixError, RuntimeProbeError};

/// Errors raised while launching an engine or waiting for it to come up.
#[derive(Debug, Error)]
pub enum EngineLaunchError {
    /// Writing engine files into the working directory failed.
    #[error("failed to prepare engine file '{path}': {source}")]
    Prepare {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The engine binary could not be spawned.
    #[error("failed to spawn engine binary '{binary:?}': {source}")]
    Spawn {
        /// Binary that was executed.
        binary: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The engine exited before reporting ready.
    #[error("engine exited before reporting ready (status: {status:?})")]
    Exited {
        /// Exit code, absent when terminated by a signal.
        status: Option<i32>,
    },
    /// Monitoring the child process failed.
    #[error("failed to monitor engine process: {source}")]
    Monitor {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The host runtime cannot run the engine.
    #[error("unsupported runtime: {source}")]
    UnsupportedRuntime {
        /// Rejection raised by the auto-fix policy.
        #[from]
        source: AutoFixError,
    },
    /// Detecting the host runtime failed.
    #[error("failed to detect the runtime version: {source}")]
    Probe {
        /// Underlying probe error.
        #[from]
        source: RuntimeProbeError,
    },
    /// Probing the readiness endpoint failed for a reason other than the
    /// listener being absent.
    #[error("failed to probe engine endpoint {endpoint}: {source}")]
    Readiness {
        /// Endpoint being probed.
        endpoint: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// The engine did not become ready in time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("engine was not ready on {probe} within {timeout:?}")]
pub struct StartupTimeoutError {
    /// Readiness budget that elapsed.
    pub timeout: Duration,
    /// Description of the readiness probe, usually the endpoint.
    pub probe: String,
}

/// Errors raised while stopping an engine. Recorded, never propagated.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Delivering a signal failed.
    #[error("failed to signal engine pid {pid}: {source}")]
    Signal {
        /// Target process.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Reaping the process failed.
    #[error("failed to wait for engine pid {pid}: {source}")]
    Wait {
        /// Target process.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The process ignored the termination request and was killed.
    #[error("engine pid {pid} did not stop within {timeout:?} and was killed")]
    Timeout {
        /// Target process.
        pid: u32,
        /// Grace period that elapsed.
        timeout: Duration,
    },
}
