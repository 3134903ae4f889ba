//! In-process engine double: binds real TCP listeners on the planned ports
//! so readiness probing and port assignments can be observed end to end.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cradle_config::{PortName, PropertyMap};

use crate::engine::{
    Engine, EngineLaunchError, EngineProcess, LaunchPlan, Readiness, ShutdownError,
    endpoint_is_reachable,
};

/// How launched fake processes behave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FakeBehaviour {
    /// Binds every port and becomes ready immediately.
    #[default]
    Ready,
    /// Launches but never binds the client port.
    NeverReady,
    /// Exits with the given status before becoming ready.
    Exits(i32),
    /// Becomes ready but fails to shut down cleanly.
    StubbornShutdown,
}

/// Snapshot of one launch request.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub ports: Vec<(PortName, u16)>,
    pub jvm_options: Vec<String>,
    pub seeds: String,
    pub endpoint: SocketAddr,
    pub system_properties: PropertyMap,
    pub config_properties: PropertyMap,
}

#[derive(Debug, Default)]
struct FakeState {
    behaviour: FakeBehaviour,
    launches: Vec<LaunchRecord>,
}

/// Engine double shared between a supervisor and test assertions.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
    shutdowns: Arc<AtomicUsize>,
}

impl FakeEngine {
    /// Engine whose processes behave as `behaviour`.
    #[must_use]
    pub fn with_behaviour(behaviour: FakeBehaviour) -> Self {
        let engine = Self::default();
        engine.set_behaviour(behaviour);
        engine
    }

    /// Changes the behaviour of later launches.
    pub fn set_behaviour(&self, behaviour: FakeBehaviour) {
        self.state.lock().expect("fake engine mutex poisoned").behaviour = behaviour;
    }

    /// Launch requests received so far.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.state
            .lock()
            .expect("fake engine mutex poisoned")
            .launches
            .clone()
    }

    /// Number of shutdown requests delivered to live processes.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Engine for FakeEngine {
    fn launch(&self, plan: &LaunchPlan) -> Result<Box<dyn EngineProcess>, EngineLaunchError> {
        let behaviour = {
            let mut state = self.state.lock().expect("fake engine mutex poisoned");
            state.launches.push(LaunchRecord {
                ports: plan.ports().iter().collect(),
                jvm_options: plan.jvm_options().to_vec(),
                seeds: plan.seeds(),
                endpoint: plan.readiness_endpoint(),
                system_properties: plan.system_properties().clone(),
                config_properties: plan.config_properties().clone(),
            });
            state.behaviour
        };

        let mut listeners = Vec::new();
        if matches!(
            behaviour,
            FakeBehaviour::Ready | FakeBehaviour::StubbornShutdown
        ) {
            for (_, port) in plan.ports().iter() {
                let listener = TcpListener::bind((plan.host(), port)).map_err(|source| {
                    EngineLaunchError::Prepare {
                        path: plan.working_directory().to_path_buf(),
                        source,
                    }
                })?;
                listeners.push(listener);
            }
        }

        Ok(Box::new(FakeProcess {
            behaviour,
            endpoint: plan.readiness_endpoint(),
            listeners,
            alive: true,
            shutdowns: Arc::clone(&self.shutdowns),
        }))
    }
}

struct FakeProcess {
    behaviour: FakeBehaviour,
    endpoint: SocketAddr,
    listeners: Vec<TcpListener>,
    alive: bool,
    shutdowns: Arc<AtomicUsize>,
}

impl EngineProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(std::process::id())
    }

    fn poll_ready(&mut self) -> Result<Readiness, EngineLaunchError> {
        if let FakeBehaviour::Exits(status) = self.behaviour {
            self.alive = false;
            return Err(EngineLaunchError::Exited {
                status: Some(status),
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
        self.alive
    }

    fn shutdown(&mut self, grace: Duration) -> Result<(), ShutdownError> {
        if !self.alive {
            return Ok(());
        }
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.listeners.clear();
        self.alive = false;
        if self.behaviour == FakeBehaviour::StubbornShutdown {
            return Err(ShutdownError::Wait {
                pid: std::process::id(),
                source: io::Error::other(format!("process ignored SIGTERM for {grace:?}")),
            });
        }
        Ok(())
    }
}
