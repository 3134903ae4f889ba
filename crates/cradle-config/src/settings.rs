//! Mutable engine settings edited by consumers before a start.
//!
//! [`EngineSettings`] plays two roles: the defaults a host seeds (usually
//! [`EngineSettings::baseline`]) and the overrides supplied for a single
//! invocation. [`crate::resolve`] merges the two into an immutable
//! [`crate::EffectiveConfig`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ports::PortName;
use crate::property::{PropertyMap, PropertyValue};

/// Startup timeout applied by the test baseline.
pub const TEST_STARTUP_TIMEOUT: Duration = Duration::from_secs(240);

const TEST_PERIOD_MS: i64 = 5000;

/// How the test baseline chooses engine ports.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PortMode {
    /// Pin the engine's well-known ports.
    #[default]
    Fixed,
    /// Leave ports to the allocator so parallel runs do not collide.
    Random,
}

/// Settings describing how the engine should be launched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Directory holding the engine's configuration, data, and logs.
    pub working_directory: Option<PathBuf>,
    /// JVM flags passed to the engine, in order.
    pub jvm_options: Vec<String>,
    /// Entries merged into the engine's on-disk configuration.
    pub config_properties: PropertyMap,
    /// Properties passed to the engine process as `-Dkey=value`.
    pub system_properties: PropertyMap,
    /// Whether incompatible JVM flags are adjusted for the detected runtime.
    pub auto_fix: Option<bool>,
    /// Explicit port overrides keyed by logical name.
    pub ports: BTreeMap<PortName, Option<u16>>,
    /// Upper bound on the wait for the engine to report readiness.
    pub startup_timeout: Option<Duration>,
    /// Whether cleanup removes the working directory.
    pub cleanup_working_directory: Option<bool>,
}

impl EngineSettings {
    /// Settings with nothing configured, suitable as an override layer.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The defaults every host starts from.
    #[must_use]
    pub fn baseline() -> Self {
        let mut settings = Self::default();
        settings
            .config_property("authenticator", "PasswordAuthenticator")
            .config_property("authorizer", "CassandraAuthorizer")
            .system_property("cassandra.superuser_setup_delay_ms", 0_i64)
            .jvm_option("-Xms1024m")
            .jvm_option("-Xmx1024m");
        settings
    }

    /// Applies the single-node test baseline with the engine's fixed ports.
    pub fn default_test_settings(&mut self) -> &mut Self {
        self.default_test_settings_with(PortMode::Fixed)
    }

    /// Applies the single-node test baseline.
    ///
    /// Gossip settling and ring-state loading are disabled and token
    /// allocation is made deterministic, which cuts engine start-up time
    /// substantially for ephemeral single-node use.
    pub fn default_test_settings_with(&mut self, mode: PortMode) -> &mut Self {
        self.jvm_option("-Xms2048m")
            .jvm_option("-Xmx2048m")
            .config_property("authenticator", "PasswordAuthenticator")
            .config_property("authorizer", "CassandraAuthorizer")
            .config_property("num_tokens", 1_i64)
            .config_property("hints_flush_period_in_ms", TEST_PERIOD_MS)
            .config_property("commitlog_sync_period_in_ms", TEST_PERIOD_MS)
            .config_property("range_request_timeout_in_ms", TEST_PERIOD_MS)
            .config_property("request_timeout_in_ms", TEST_PERIOD_MS)
            .system_property("cassandra.skip_wait_for_gossip_to_settle", 0_i64)
            .system_property("cassandra.load_ring_state", false)
            .system_property("cassandra.initial_token", 1_i64)
            .system_property("cassandra.num_tokens", "nil")
            .system_property(
                "cassandra.allocate_tokens_for_local_replication_factor",
                "nil",
            )
            .system_property("num_tokens", 1_i64)
            .system_property("allocate_tokens_for_local_replication_factor", 1_i64);

        match mode {
            PortMode::Fixed => {
                // Written as engine entries so later entries or overrides
                // replace them key by key.
                for name in PortName::ALL {
                    self.ports.remove(&name);
                    self.config_property(name.config_key(), name.engine_default());
                }
            }
            PortMode::Random => {
                for name in PortName::ALL {
                    self.ports.insert(name, None);
                    self.config_properties.remove(name.config_key());
                }
            }
        }

        // Engines on small CI machines need longer to settle.
        self.startup_timeout = Some(TEST_STARTUP_TIMEOUT);
        self
    }

    /// Appends a JVM flag.
    pub fn jvm_option(&mut self, option: impl Into<String>) -> &mut Self {
        self.jvm_options.push(option.into());
        self
    }

    /// Sets an engine configuration entry.
    pub fn config_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> &mut Self {
        self.config_properties.insert(key.into(), value.into());
        self
    }

    /// Sets a system property for the engine process.
    pub fn system_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> &mut Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Pins a logical port to an explicit value.
    pub fn port(&mut self, name: PortName, port: u16) -> &mut Self {
        self.ports.insert(name, Some(port));
        self
    }

    /// Sets the working directory.
    pub fn working_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Enables or disables the JVM auto-fix policy.
    pub fn auto_fix(&mut self, enabled: bool) -> &mut Self {
        self.auto_fix = Some(enabled);
        self
    }

    /// Sets the readiness timeout.
    pub fn startup_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Requests removal of the working directory on cleanup.
    pub fn cleanup_working_directory(&mut self, enabled: bool) -> &mut Self {
        self.cleanup_working_directory = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_seeds_authentication_and_heap() {
        let settings = EngineSettings::baseline();
        assert_eq!(
            settings.config_properties.get("authenticator"),
            Some(&PropertyValue::from("PasswordAuthenticator"))
        );
        assert_eq!(
            settings
                .system_properties
                .get("cassandra.superuser_setup_delay_ms"),
            Some(&PropertyValue::Int(0))
        );
        assert_eq!(settings.jvm_options, vec!["-Xms1024m", "-Xmx1024m"]);
        assert!(settings.ports.is_empty());
    }

    #[test]
    fn test_settings_disable_gossip_wait_and_ring_state() {
        let mut settings = EngineSettings::baseline();
        settings.default_test_settings();
        assert_eq!(
            settings
                .system_properties
                .get("cassandra.skip_wait_for_gossip_to_settle"),
            Some(&PropertyValue::Int(0))
        );
        assert_eq!(
            settings.system_properties.get("cassandra.load_ring_state"),
            Some(&PropertyValue::Bool(false))
        );
        assert_eq!(settings.startup_timeout, Some(TEST_STARTUP_TIMEOUT));
        // Later heap flags win on the JVM command line.
        assert_eq!(
            settings.jvm_options,
            vec!["-Xms1024m", "-Xmx1024m", "-Xms2048m", "-Xmx2048m"]
        );
        assert!(settings.ports.is_empty());
        assert_eq!(
            settings.config_properties.get("storage_port"),
            Some(&PropertyValue::Int(7000))
        );
        assert_eq!(
            settings.config_properties.get("native_transport_port"),
            Some(&PropertyValue::Int(9042))
        );
    }

    #[test]
    fn later_port_entries_replace_the_fixed_test_ports() {
        let mut settings = EngineSettings::baseline();
        settings
            .default_test_settings()
            .config_property("storage_port", 18000_i64);
        assert_eq!(
            settings.config_properties.get("storage_port"),
            Some(&PropertyValue::Int(18000))
        );
    }

    #[test]
    fn random_port_mode_leaves_ports_unset() {
        let mut settings = EngineSettings::empty();
        settings
            .config_property("storage_port", 7000_i64)
            .default_test_settings_with(PortMode::Random);
        assert!(settings.ports.values().all(Option::is_none));
        assert!(!settings.config_properties.contains_key("storage_port"));
    }
}
