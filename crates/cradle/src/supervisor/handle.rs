use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use cradle_config::EffectiveConfig;

use crate::ports::AllocatedPorts;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a supervised engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupervisorState {
    /// Nothing launched yet, or cleaned up.
    #[default]
    Idle,
    /// Launched and waiting for readiness.
    Starting,
    /// Ready and serving clients.
    Running,
    /// Shutdown in progress.
    Stopping,
    /// Shut down; call `cleanup` before starting again.
    Stopped,
    /// Start failed; the process may still need stopping.
    Failed,
}

impl SupervisorState {
    /// Returns `true` when a process may still be alive.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Stopping | Self::Failed
        )
    }

    /// Lower-case label used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One launched engine instance.
#[derive(Debug, Clone)]
pub struct ManagedProcessHandle {
    id: u64,
    pid: Option<u32>,
    config: Arc<EffectiveConfig>,
    ports: AllocatedPorts,
    host: IpAddr,
    state: SupervisorState,
    started_at: SystemTime,
}

impl ManagedProcessHandle {
    pub(crate) fn new(
        pid: Option<u32>,
        config: Arc<EffectiveConfig>,
        ports: AllocatedPorts,
        host: IpAddr,
    ) -> Self {
        Self {
            id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            pid,
            config,
            ports,
            host,
            state: SupervisorState::Starting,
            started_at: SystemTime::now(),
        }
    }

    /// Identifier unique within this process.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Operating system process id, when the engine exposes one.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Configuration the instance was started with.
    #[must_use]
    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    /// Ports bound by the instance.
    #[must_use]
    pub const fn ports(&self) -> &AllocatedPorts {
        &self.ports
    }

    /// Interface the instance listens on.
    #[must_use]
    pub const fn host(&self) -> IpAddr {
        self.host
    }

    /// State at the time of the last transition.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Wall-clock launch time.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub(crate) fn set_state(&mut self, state: SupervisorState) {
        self.state = state;
    }
}
