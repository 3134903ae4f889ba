//! Port allocation for engine instances.
//!
//! Explicit ports are used verbatim once validated. Every other logical port
//! receives a free ephemeral port chosen by the operating system. Values
//! chosen here are recorded in a process-wide reservation set until the
//! owning [`AllocatedPorts`] is dropped, so concurrent supervisors in one
//! process never receive the same port.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use cradle_config::{ConfigError, PortName, validate_ports};

pub(crate) const PORTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::ports");

/// Attempts made per logical port before allocation gives up.
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 5;

static RESERVED: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn reserved() -> MutexGuard<'static, HashSet<u16>> {
    RESERVED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors raised while allocating ports.
#[derive(Debug, Error)]
pub enum PortAllocationError {
    /// Explicit ports failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No usable port was found within the attempt budget.
    #[error("no free port found for '{port}' after {attempts} attempts")]
    Exhausted {
        /// Logical port left without a value.
        port: PortName,
        /// Attempts made.
        attempts: u32,
    },
}

/// Host interface that allocated ports are probed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostScope {
    host: IpAddr,
}

impl HostScope {
    /// Scope bound to the IPv4 loopback interface.
    #[must_use]
    pub const fn loopback() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    /// Scope bound to an arbitrary interface.
    #[must_use]
    pub const fn new(host: IpAddr) -> Self {
        Self { host }
    }

    /// Interface address.
    #[must_use]
    pub const fn host(&self) -> IpAddr {
        self.host
    }
}

impl Default for HostScope {
    fn default() -> Self {
        Self::loopback()
    }
}

impl fmt::Display for HostScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.host.fmt(formatter)
    }
}

#[derive(Debug)]
struct Reservation {
    ports: Vec<u16>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut set = reserved();
        for port in &self.ports {
            set.remove(port);
        }
    }
}

/// Ports assigned to one engine instance.
///
/// Clones share the underlying reservation; it is released when the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct AllocatedPorts {
    ports: BTreeMap<PortName, u16>,
    _reservation: Arc<Reservation>,
}

impl AllocatedPorts {
    /// Port assigned to `name`.
    #[must_use]
    pub fn get(&self, name: PortName) -> Option<u16> {
        self.ports.get(&name).copied()
    }

    /// Iterates the assignments in logical port order.
    pub fn iter(&self) -> impl Iterator<Item = (PortName, u16)> + '_ {
        self.ports.iter().map(|(name, port)| (*name, *port))
    }

    /// Number of assigned ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns `true` when nothing was assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl PartialEq for AllocatedPorts {
    fn eq(&self, other: &Self) -> bool {
        self.ports == other.ports
    }
}

impl Eq for AllocatedPorts {}

/// Chooses concrete ports for the logical ports of an engine.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    attempts: u32,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PortAllocator {
    /// Allocator with [`DEFAULT_ALLOCATION_ATTEMPTS`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    /// Overrides the attempt budget per logical port. Zero is treated as one.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Attempt budget per logical port.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Assigns a port to every entry of `explicit`.
    ///
    /// Entries carrying a value keep it. Entries without one receive a port
    /// that is currently bindable on `scope`, distinct from every explicit
    /// value, every value chosen earlier in this call, and every value held
    /// by another live allocation in this process.
    ///
    /// # Errors
    ///
    /// Returns [`PortAllocationError::Config`] when explicit values are out
    /// of range or duplicated, and [`PortAllocationError::Exhausted`] when no
    /// candidate survives the attempt budget.
    pub fn allocate(
        &self,
        explicit: &BTreeMap<PortName, Option<u16>>,
        scope: HostScope,
    ) -> Result<AllocatedPorts, PortAllocationError> {
        validate_ports(explicit)?;

        let mut taken: HashSet<u16> = explicit.values().filter_map(|port| *port).collect();
        let mut ports = BTreeMap::new();
        let mut chosen = Vec::new();

        // Held for the whole call so concurrent allocations see each other.
        let mut reservations = reserved();
        for (name, port) in explicit {
            let port = match port {
                Some(port) => *port,
                None => {
                    let port = self.pick(*name, scope, &taken, &reservations)?;
                    chosen.push(port);
                    port
                }
            };
            taken.insert(port);
            ports.insert(*name, port);
        }
        reservations.extend(chosen.iter().copied());
        drop(reservations);

        debug!(
            target: PORTS_TARGET,
            host = %scope,
            ports = ?ports,
            "ports allocated"
        );
        Ok(AllocatedPorts {
            ports,
            _reservation: Arc::new(Reservation { ports: chosen }),
        })
    }

    fn pick(
        &self,
        name: PortName,
        scope: HostScope,
        taken: &HashSet<u16>,
        reservations: &HashSet<u16>,
    ) -> Result<u16, PortAllocationError> {
        for attempt in 1..=self.attempts {
            match probe_free_port(scope) {
                Ok(port) if taken.contains(&port) || reservations.contains(&port) => {
                    debug!(
                        target: PORTS_TARGET,
                        port_name = %name,
                        port,
                        attempt,
                        "candidate port already claimed"
                    );
                }
                Ok(port) if port_is_bindable(scope, port) => return Ok(port),
                Ok(port) => {
                    debug!(
                        target: PORTS_TARGET,
                        port_name = %name,
                        port,
                        attempt,
                        "candidate port no longer bindable"
                    );
                }
                Err(error) => {
                    debug!(
                        target: PORTS_TARGET,
                        port_name = %name,
                        attempt,
                        error = %error,
                        "failed to probe for a free port"
                    );
                }
            }
        }
        Err(PortAllocationError::Exhausted {
            port: name,
            attempts: self.attempts,
        })
    }
}

fn probe_free_port(scope: HostScope) -> io::Result<u16> {
    let listener = TcpListener::bind((scope.host(), 0))?;
    Ok(listener.local_addr()?.port())
}

fn port_is_bindable(scope: HostScope, port: u16) -> bool {
    TcpListener::bind((scope.host(), port)).is_ok()
}
