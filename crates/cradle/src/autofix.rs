//! JVM flag adjustment for engine releases that predate the host runtime.
//!
//! Cassandra 4 ships JVM option files for JDK 8 and 11 only. Newer runtimes
//! need extra module exports and an explicit security manager opt-in, and
//! runtimes from 18 onwards cannot run the engine at all. The adjustment is a
//! strategy so other engine releases can supply their own rules.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::warn;

pub(crate) const AUTOFIX_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::autofix");

/// Feature release of a Java runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeVersion {
    major: u32,
}

impl RuntimeVersion {
    /// Builds a version from its feature release number.
    #[must_use]
    pub const fn new(major: u32) -> Self {
        Self { major }
    }

    /// Feature release number (`17` for `17.0.2`, `8` for `1.8.0_292`).
    #[must_use]
    pub const fn major(self) -> u32 {
        self.major
    }

    /// Extracts the version from `java -version` output.
    ///
    /// Both the legacy `1.x` scheme and the modern scheme are understood.
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        let quoted = output.split('"').nth(1)?;
        let mut parts = quoted.split(['.', '_', '-', '+']);
        let first: u32 = parts.next()?.parse().ok()?;
        let major = if first == 1 {
            parts.next()?.parse().ok()?
        } else {
            first
        };
        Some(Self::new(major))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "JDK {}", self.major)
    }
}

/// Errors raised while detecting the runtime version.
#[derive(Debug, Error)]
pub enum RuntimeProbeError {
    /// The runtime binary could not be executed.
    #[error("failed to run '{program:?}': {source}")]
    Spawn {
        /// Program that was executed.
        program: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The version banner could not be interpreted.
    #[error("unrecognised runtime version output: {output}")]
    Unrecognised {
        /// Raw banner text.
        output: String,
    },
}

/// Detects the Java runtime that will host the engine.
pub trait RuntimeProbe: Send + Sync {
    /// Returns the runtime version.
    fn detect(&self) -> Result<RuntimeVersion, RuntimeProbeError>;
}

/// Probe that runs `java -version`, preferring `$JAVA_HOME/bin/java`.
#[derive(Debug, Clone, Default)]
pub struct JavaRuntimeProbe {
    program: Option<OsString>,
}

impl JavaRuntimeProbe {
    /// Probe that locates `java` through `JAVA_HOME` or `PATH`.
    #[must_use]
    pub const fn new() -> Self {
        Self { program: None }
    }

    /// Probe that runs a specific binary.
    #[must_use]
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn program(&self) -> OsString {
        if let Some(program) = &self.program {
            return program.clone();
        }
        env::var_os("JAVA_HOME")
            .map(|home| PathBuf::from(home).join("bin").join("java").into_os_string())
            .unwrap_or_else(|| OsString::from("java"))
    }
}

impl RuntimeProbe for JavaRuntimeProbe {
    fn detect(&self) -> Result<RuntimeVersion, RuntimeProbeError> {
        let program = self.program();
        let output = Command::new(&program)
            .arg("-version")
            .output()
            .map_err(|source| RuntimeProbeError::Spawn {
                program: program.clone(),
                source,
            })?;
        // The banner goes to stderr on every mainstream JDK.
        let banner = if output.stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            String::from_utf8_lossy(&output.stderr).into_owned()
        };
        RuntimeVersion::parse(&banner).ok_or(RuntimeProbeError::Unrecognised { output: banner })
    }
}

/// Probe that reports a fixed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRuntimeProbe(pub RuntimeVersion);

impl RuntimeProbe for StaticRuntimeProbe {
    fn detect(&self) -> Result<RuntimeVersion, RuntimeProbeError> {
        Ok(self.0)
    }
}

/// Errors raised when a runtime cannot host the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason} (detected {runtime})")]
pub struct AutoFixError {
    /// Runtime that was rejected.
    pub runtime: RuntimeVersion,
    reason: String,
}

impl AutoFixError {
    /// Builds an error rejecting `runtime`.
    #[must_use]
    pub fn unsupported(runtime: RuntimeVersion, reason: impl Into<String>) -> Self {
        Self {
            runtime,
            reason: reason.into(),
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }
}

/// Strategy that adapts JVM flags to the runtime hosting the engine.
pub trait AutoFixPolicy: Send + Sync {
    /// Checks that `runtime` can host the engine at all.
    ///
    /// Consulted even when flag adjustment is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`AutoFixError`] when no flags would make the runtime work.
    fn supports(&self, runtime: RuntimeVersion) -> Result<(), AutoFixError> {
        let _ = runtime;
        Ok(())
    }

    /// Returns the flags to launch with on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`AutoFixError`] when the runtime cannot host the engine.
    fn adjust(&self, runtime: RuntimeVersion, flags: &[String]) -> Result<Vec<String>, AutoFixError>;
}

/// Flags that let Cassandra 4 run on JDK 15 to 17.
pub const CASSANDRA4_JDK17_FLAGS: &[&str] = &[
    "-Djava.security.manager=allow",
    "--add-exports=java.base/jdk.internal.misc=ALL-UNNAMED",
    "--add-exports=java.base/jdk.internal.ref=ALL-UNNAMED",
    "--add-exports=java.base/sun.nio.ch=ALL-UNNAMED",
    "--add-exports=java.management.rmi/com.sun.jmx.remote.internal.rmi=ALL-UNNAMED",
    "--add-exports=java.rmi/sun.rmi.registry=ALL-UNNAMED",
    "--add-exports=java.rmi/sun.rmi.server=ALL-UNNAMED",
    "--add-exports=java.sql/java.sql=ALL-UNNAMED",
    "--add-opens=java.base/java.lang.module=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.loader=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.ref=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.reflect=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.math=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.module=ALL-UNNAMED",
    "--add-opens=java.base/jdk.internal.util.jar=ALL-UNNAMED",
    "--add-opens=jdk.management/com.sun.management.internal=ALL-UNNAMED",
];

/// Policy for Cassandra 4 releases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cassandra4Policy;

impl AutoFixPolicy for Cassandra4Policy {
    fn supports(&self, runtime: RuntimeVersion) -> Result<(), AutoFixError> {
        if runtime.major() >= 18 {
            return Err(AutoFixError::unsupported(
                runtime,
                "Cassandra needs SecurityManager which has been removed in JDK >= 18",
            ));
        }
        Ok(())
    }

    fn adjust(&self, runtime: RuntimeVersion, flags: &[String]) -> Result<Vec<String>, AutoFixError> {
        self.supports(runtime)?;
        match runtime.major() {
            15..=17 => {
                warn!(
                    target: AUTOFIX_TARGET,
                    runtime = %runtime,
                    "Cassandra 4 officially supports JDK 8 and 11 only; applying JVM option fixes"
                );
                let mut adjusted = flags.to_vec();
                for flag in CASSANDRA4_JDK17_FLAGS {
                    if !adjusted.iter().any(|existing| existing == flag) {
                        adjusted.push((*flag).to_owned());
                    }
                }
                Ok(adjusted)
            }
            _ => Ok(flags.to_vec()),
        }
    }
}
