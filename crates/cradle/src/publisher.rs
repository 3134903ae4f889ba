//! Publication of runtime facts about a running engine.
//!
//! Facts are plain string key/value pairs: allocated ports, the working
//! directory, the host, and the engine pid. They are written to a
//! [`FactBoard`] when the engine becomes ready and retracted when it stops,
//! so readers never observe facts for an engine that is not running.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use cradle_config::PortName;

use crate::supervisor::ManagedProcessHandle;

pub(crate) const PUBLISHER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::publisher");

/// Fact key for the working directory.
pub const WORKING_DIRECTORY_FACT: &str = "cassandra.working.directory";
/// Fact key for the listen host.
pub const HOST_FACT: &str = "cassandra.host";
/// Fact key for the engine process id.
pub const PID_FACT: &str = "cassandra.pid";

static GLOBAL_BOARD: Lazy<Arc<FactBoard>> = Lazy::new(|| Arc::new(FactBoard::default()));

/// Reads a fact from the process-wide board.
#[must_use]
pub fn fact(key: &str) -> Option<String> {
    FactBoard::global().get(key)
}

/// Shared store of published facts.
#[derive(Debug, Default)]
pub struct FactBoard {
    facts: RwLock<BTreeMap<String, String>>,
}

impl FactBoard {
    /// The process-wide board used by default.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_BOARD)
    }

    /// A private board, useful when several engines run side by side.
    #[must_use]
    pub fn isolated() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reads a single fact.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.facts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copies every fact currently on the board.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.facts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn insert_all(&self, facts: &PublishedFacts) {
        let mut board = self.facts.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in facts.iter() {
            board.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Removes facts still carrying the values from `facts`, leaving values
    /// written since by another publisher untouched.
    fn remove_all(&self, facts: &PublishedFacts) {
        let mut board = self.facts.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in facts.iter() {
            if board.get(key).is_some_and(|current| current == value) {
                board.remove(key);
            }
        }
    }
}

/// Facts describing one running engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedFacts {
    facts: BTreeMap<String, String>,
}

impl PublishedFacts {
    /// Derives the facts for `handle`.
    #[must_use]
    pub fn from_handle(handle: &ManagedProcessHandle) -> Self {
        let mut facts = BTreeMap::new();
        for (name, port) in handle.ports().iter() {
            facts.insert(name.fact_key().to_owned(), port.to_string());
        }
        facts.insert(
            WORKING_DIRECTORY_FACT.to_owned(),
            handle.config().working_directory().display().to_string(),
        );
        facts.insert(HOST_FACT.to_owned(), handle.host().to_string());
        if let Some(pid) = handle.pid() {
            facts.insert(PID_FACT.to_owned(), pid.to_string());
        }
        Self { facts }
    }

    /// Reads a fact.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    /// Port published for `name`.
    #[must_use]
    pub fn port(&self, name: PortName) -> Option<u16> {
        self.get(name.fact_key())?.parse().ok()
    }

    /// Iterates facts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.facts
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns `true` when nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts as environment variables for child processes.
    ///
    /// `cassandra.storage.port.ssl` becomes `CASSANDRA_STORAGE_PORT_SSL`.
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(key, value)| (environment_name(key), value.to_owned()))
            .collect()
    }
}

fn environment_name(key: &str) -> String {
    key.chars()
        .map(|ch| match ch {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// Publishes and retracts facts for a supervisor.
#[derive(Debug)]
pub struct PropertyPublisher {
    board: Arc<FactBoard>,
    current: Option<PublishedFacts>,
}

impl Default for PropertyPublisher {
    fn default() -> Self {
        Self::new(FactBoard::global())
    }
}

impl PropertyPublisher {
    /// Publisher writing to `board`.
    #[must_use]
    pub const fn new(board: Arc<FactBoard>) -> Self {
        Self {
            board,
            current: None,
        }
    }

    /// Board receiving the facts.
    #[must_use]
    pub fn board(&self) -> &Arc<FactBoard> {
        &self.board
    }

    /// Facts currently published, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&PublishedFacts> {
        self.current.as_ref()
    }

    /// Publishes the facts of a running handle, replacing earlier ones.
    pub fn publish(&mut self, handle: &ManagedProcessHandle) -> PublishedFacts {
        self.retract();
        let facts = PublishedFacts::from_handle(handle);
        self.board.insert_all(&facts);
        debug!(
            target: PUBLISHER_TARGET,
            instance = handle.id(),
            facts = ?facts.facts,
            "facts published"
        );
        self.current = Some(facts.clone());
        facts
    }

    /// Withdraws the facts published last. Idempotent.
    pub fn retract(&mut self) {
        if let Some(facts) = self.current.take() {
            self.board.remove_all(&facts);
            debug!(target: PUBLISHER_TARGET, "facts retracted");
        }
    }
}
