//! The managed engine as seen by the supervisor.
//!
//! The supervisor only needs to launch an engine, ask whether it is ready,
//! and stop it. [`Engine`] and [`EngineProcess`] capture that surface so the
//! production [`CommandEngine`] can be swapped for in-process doubles.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cradle_config::{EffectiveConfig, PortName, PropertyMap, PropertyValue};

use crate::ports::{AllocatedPorts, HostScope};

mod command;
mod conf;
mod errors;
mod probe;

pub use command::{CommandEngine, CommandProcess};
pub use conf::{ENGINE_CONFIG_FILE, write_engine_config};
pub use errors::{EngineLaunchError, ShutdownError, StartupTimeoutError};
pub use probe::endpoint_is_reachable;

/// Result of a single readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The engine accepts client connections.
    Ready,
    /// The engine is still starting.
    Pending,
}

/// A launched engine process.
pub trait EngineProcess: Send {
    /// Operating system process id, when known.
    fn pid(&self) -> Option<u32>;

    /// Checks readiness once without blocking for long.
    ///
    /// # Errors
    ///
    /// Returns [`EngineLaunchError::Exited`] when the process has died and
    /// other variants when the probe itself fails.
    fn poll_ready(&mut self) -> Result<Readiness, EngineLaunchError>;

    /// Returns `true` while the process is alive.
    fn is_running(&mut self) -> bool;

    /// Requests termination and waits up to `grace` before forcing it.
    ///
    /// # Errors
    ///
    /// Returns a [`ShutdownError`] when signalling or reaping fails, or when
    /// the process had to be killed.
    fn shutdown(&mut self, grace: Duration) -> Result<(), ShutdownError>;
}

/// Something that can launch engine processes.
pub trait Engine: Send {
    /// Launches an engine described by `plan`. Does not wait for readiness.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineLaunchError`] when preparation or spawning fails.
    fn launch(&self, plan: &LaunchPlan) -> Result<Box<dyn EngineProcess>, EngineLaunchError>;
}

/// Everything an engine needs to start one instance.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    working_directory: PathBuf,
    host: IpAddr,
    ports: AllocatedPorts,
    jvm_options: Vec<String>,
    system_properties: PropertyMap,
    config_properties: PropertyMap,
}

impl LaunchPlan {
    /// Builds a plan, writing the allocated ports into the engine
    /// configuration properties.
    #[must_use]
    pub fn new(
        config: &EffectiveConfig,
        ports: AllocatedPorts,
        scope: HostScope,
        jvm_options: Vec<String>,
    ) -> Self {
        let mut config_properties = config.config_properties().clone();
        for (name, port) in ports.iter() {
            config_properties.insert(name.config_key().to_owned(), PropertyValue::from(port));
        }
        Self {
            working_directory: config.working_directory().to_path_buf(),
            host: scope.host(),
            ports,
            jvm_options,
            system_properties: config.system_properties().clone(),
            config_properties,
        }
    }

    /// Directory owned by the instance.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        self.working_directory.as_path()
    }

    /// Interface the engine listens on.
    #[must_use]
    pub const fn host(&self) -> IpAddr {
        self.host
    }

    /// Ports assigned to the instance.
    #[must_use]
    pub const fn ports(&self) -> &AllocatedPorts {
        &self.ports
    }

    /// Port bound for `name`, falling back to the engine default.
    #[must_use]
    pub fn port(&self, name: PortName) -> u16 {
        self.ports.get(name).unwrap_or_else(|| name.engine_default())
    }

    /// JVM flags after any auto-fix adjustment.
    #[must_use]
    pub fn jvm_options(&self) -> &[String] {
        &self.jvm_options
    }

    /// JVM system properties.
    #[must_use]
    pub const fn system_properties(&self) -> &PropertyMap {
        &self.system_properties
    }

    /// Engine configuration entries, including the allocated ports.
    #[must_use]
    pub const fn config_properties(&self) -> &PropertyMap {
        &self.config_properties
    }

    /// Seed list for a single-node cluster.
    #[must_use]
    pub fn seeds(&self) -> String {
        format!("{}:{}", self.host, self.port(PortName::Storage))
    }

    /// Client endpoint polled for readiness.
    #[must_use]
    pub fn readiness_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port(PortName::NativeTransport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use cradle_config::{EngineSettings, resolve};
    use tempfile::TempDir;

    use crate::ports::PortAllocator;

    #[test]
    fn plan_writes_ports_and_seeds() {
        let dir = TempDir::new().expect("temp dir");
        let mut overrides = EngineSettings::empty();
        overrides
            .working_directory(dir.path())
            .port(PortName::Storage, 18000)
            .port(PortName::StorageSsl, 18001)
            .port(PortName::NativeTransport, 18002);
        let config = resolve(&EngineSettings::baseline(), &overrides).expect("resolve");
        let explicit: BTreeMap<_, _> = config.explicit_ports().clone();
        let ports = PortAllocator::new()
            .allocate(&explicit, HostScope::loopback())
            .expect("allocate");

        let plan = LaunchPlan::new(&config, ports, HostScope::loopback(), Vec::new());

        assert_eq!(
            plan.config_properties().get("storage_port"),
            Some(&PropertyValue::Int(18000))
        );
        assert_eq!(
            plan.config_properties().get("native_transport_port"),
            Some(&PropertyValue::Int(18002))
        );
        assert_eq!(plan.seeds(), "127.0.0.1:18000");
        assert_eq!(plan.readiness_endpoint().port(), 18002);
        assert_eq!(plan.working_directory(), config.working_directory());
    }
}
