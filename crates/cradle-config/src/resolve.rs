//! Resolution of default and override settings into an effective config.
//!
//! Resolution is a pure merge apart from one side effect: the working
//! directory is created when missing so writability can be verified before
//! any process is launched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::defaults::{DEFAULT_STARTUP_TIMEOUT, default_working_directory};
use crate::ports::PortName;
use crate::property::{PropertyMap, PropertyValue};
use crate::settings::EngineSettings;

/// System properties owned by the JVM auto-fix policy while it is enabled.
pub const AUTO_FIX_RESERVED_KEYS: &[&str] = &["java.security.manager"];

/// Errors raised while validating or resolving engine settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two logical ports were given the same explicit value.
    #[error("ports '{first}' and '{second}' are both set to {port}")]
    DuplicatePort {
        /// First logical port holding the value.
        first: PortName,
        /// Second logical port holding the value.
        second: PortName,
        /// The contested port number.
        port: u16,
    },
    /// An explicit port lies outside the TCP range.
    #[error("port '{name}' must be within 1-65535, got {value}")]
    PortOutOfRange {
        /// Logical port carrying the value.
        name: PortName,
        /// Offending value.
        value: i64,
    },
    /// A port configuration property was not an integer.
    #[error("configuration property '{key}' must be an integer port, got '{value}'")]
    InvalidPortProperty {
        /// Engine configuration key.
        key: String,
        /// Offending value.
        value: PropertyValue,
    },
    /// A system property collides with a key managed by the auto-fix policy.
    #[error("system property '{key}' is managed by the JVM auto-fix policy; disable auto-fix to set it")]
    ReservedKey {
        /// Reserved property key.
        key: String,
    },
    /// The working directory could not be created or written.
    #[error("working directory '{path}' is not writable: {source}")]
    WorkingDirectory {
        /// Directory that failed the check.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A `KEY=VALUE` assignment could not be parsed.
    #[error("expected KEY=VALUE, got '{input}'")]
    InvalidAssignment {
        /// Raw input.
        input: String,
    },
    /// A logical port name was not recognised.
    #[error("unknown port '{name}'; expected storage, storage.ssl, or native.transport")]
    UnknownPort {
        /// Name as supplied.
        name: String,
    },
}

/// Immutable configuration for a single engine start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    working_directory: PathBuf,
    jvm_options: Vec<String>,
    config_properties: PropertyMap,
    system_properties: PropertyMap,
    auto_fix_enabled: bool,
    explicit_ports: BTreeMap<PortName, Option<u16>>,
    startup_timeout: Duration,
    cleanup_working_directory: bool,
}

impl EffectiveConfig {
    /// Directory owned by the engine instance.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        self.working_directory.as_path()
    }

    /// JVM flags in launch order.
    #[must_use]
    pub fn jvm_options(&self) -> &[String] {
        &self.jvm_options
    }

    /// Entries merged into the engine configuration file.
    #[must_use]
    pub const fn config_properties(&self) -> &PropertyMap {
        &self.config_properties
    }

    /// Properties passed to the engine process.
    #[must_use]
    pub const fn system_properties(&self) -> &PropertyMap {
        &self.system_properties
    }

    /// Whether the JVM auto-fix policy applies.
    #[must_use]
    pub const fn auto_fix_enabled(&self) -> bool {
        self.auto_fix_enabled
    }

    /// Every required logical port with its explicit value, if any.
    #[must_use]
    pub const fn explicit_ports(&self) -> &BTreeMap<PortName, Option<u16>> {
        &self.explicit_ports
    }

    /// Upper bound on the readiness wait.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Whether cleanup removes the working directory.
    #[must_use]
    pub const fn cleanup_working_directory(&self) -> bool {
        self.cleanup_working_directory
    }
}

/// Merges `overrides` over `defaults`.
///
/// Maps merge key by key, scalar settings are replaced when set, and the JVM
/// option list is replaced only by a non-empty override.
///
/// # Errors
///
/// Returns a [`ConfigError`] when ports are invalid or duplicated, a reserved
/// key is set while auto-fix is enabled, or the working directory cannot be
/// written.
pub fn resolve(
    defaults: &EngineSettings,
    overrides: &EngineSettings,
) -> Result<EffectiveConfig, ConfigError> {
    let mut config_properties = defaults.config_properties.clone();
    config_properties.extend(overrides.config_properties.clone());

    let mut system_properties = defaults.system_properties.clone();
    system_properties.extend(overrides.system_properties.clone());

    let mut ports = defaults.ports.clone();
    ports.extend(overrides.ports.clone());

    let jvm_options = if overrides.jvm_options.is_empty() {
        defaults.jvm_options.clone()
    } else {
        overrides.jvm_options.clone()
    };

    let auto_fix_enabled = overrides.auto_fix.or(defaults.auto_fix).unwrap_or(true);
    if auto_fix_enabled {
        reject_reserved_keys(&system_properties)?;
    }

    let explicit_ports = explicit_ports(&ports, &config_properties)?;
    validate_ports(&explicit_ports)?;

    let working_directory = overrides
        .working_directory
        .clone()
        .or_else(|| defaults.working_directory.clone())
        .unwrap_or_else(default_working_directory);
    let working_directory = prepare_working_directory(&working_directory)?;

    Ok(EffectiveConfig {
        working_directory,
        jvm_options,
        config_properties,
        system_properties,
        auto_fix_enabled,
        explicit_ports,
        startup_timeout: overrides
            .startup_timeout
            .or(defaults.startup_timeout)
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT),
        cleanup_working_directory: overrides
            .cleanup_working_directory
            .or(defaults.cleanup_working_directory)
            .unwrap_or(false),
    })
}

/// Checks explicit ports for range and pairwise distinctness.
///
/// # Errors
///
/// Returns [`ConfigError::PortOutOfRange`] for port zero and
/// [`ConfigError::DuplicatePort`] when two names share a value.
pub fn validate_ports(ports: &BTreeMap<PortName, Option<u16>>) -> Result<(), ConfigError> {
    let mut seen: BTreeMap<u16, PortName> = BTreeMap::new();
    for (name, port) in ports {
        let Some(port) = *port else {
            continue;
        };
        if port == 0 {
            return Err(ConfigError::PortOutOfRange {
                name: *name,
                value: 0,
            });
        }
        if let Some(first) = seen.insert(port, *name) {
            return Err(ConfigError::DuplicatePort {
                first,
                second: *name,
                port,
            });
        }
    }
    Ok(())
}

fn explicit_ports(
    ports: &BTreeMap<PortName, Option<u16>>,
    config_properties: &PropertyMap,
) -> Result<BTreeMap<PortName, Option<u16>>, ConfigError> {
    let mut resolved = BTreeMap::new();
    for name in PortName::ALL {
        let explicit = match ports.get(&name).copied().flatten() {
            Some(port) => Some(port),
            None => port_from_property(name, config_properties)?,
        };
        resolved.insert(name, explicit);
    }
    Ok(resolved)
}

fn port_from_property(
    name: PortName,
    config_properties: &PropertyMap,
) -> Result<Option<u16>, ConfigError> {
    let Some(value) = config_properties.get(name.config_key()) else {
        return Ok(None);
    };
    let Some(raw) = value.as_int() else {
        return Err(ConfigError::InvalidPortProperty {
            key: name.config_key().to_owned(),
            value: value.clone(),
        });
    };
    match u16::try_from(raw) {
        Ok(port) if port > 0 => Ok(Some(port)),
        _ => Err(ConfigError::PortOutOfRange { name, value: raw }),
    }
}

fn reject_reserved_keys(system_properties: &PropertyMap) -> Result<(), ConfigError> {
    match AUTO_FIX_RESERVED_KEYS
        .iter()
        .find(|key| system_properties.contains_key(**key))
    {
        Some(key) => Err(ConfigError::ReservedKey {
            key: (*key).to_owned(),
        }),
        None => Ok(()),
    }
}

fn prepare_working_directory(path: &Path) -> Result<PathBuf, ConfigError> {
    let failure = |source| ConfigError::WorkingDirectory {
        path: path.to_path_buf(),
        source,
    };
    let absolute = std::path::absolute(path).map_err(failure)?;
    fs::create_dir_all(&absolute).map_err(failure)?;
    // Probe file is removed when dropped.
    tempfile::Builder::new()
        .prefix(".cradle-probe")
        .tempfile_in(&absolute)
        .map_err(failure)?;
    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn workdir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    fn defaults_in(dir: &TempDir) -> EngineSettings {
        let mut settings = EngineSettings::baseline();
        settings.working_directory(dir.path().join("cassandra"));
        settings
    }

    #[rstest]
    fn resolution_is_deterministic(workdir: TempDir) {
        let defaults = defaults_in(&workdir);
        let mut overrides = EngineSettings::empty();
        overrides
            .config_property("num_tokens", 1_i64)
            .system_property("cassandra.load_ring_state", false);

        let first = resolve(&defaults, &overrides).expect("first resolution");
        let second = resolve(&defaults, &overrides).expect("second resolution");
        assert_eq!(first, second);
    }

    #[rstest]
    fn maps_merge_key_by_key(workdir: TempDir) {
        let defaults = defaults_in(&workdir);
        let mut overrides = EngineSettings::empty();
        overrides.config_property("authenticator", "AllowAllAuthenticator");

        let config = resolve(&defaults, &overrides).expect("resolution");
        assert_eq!(
            config.config_properties().get("authenticator"),
            Some(&PropertyValue::from("AllowAllAuthenticator"))
        );
        assert_eq!(
            config.config_properties().get("authorizer"),
            Some(&PropertyValue::from("CassandraAuthorizer"))
        );
    }

    #[rstest]
    fn empty_jvm_override_keeps_defaults(workdir: TempDir) {
        let defaults = defaults_in(&workdir);
        let config = resolve(&defaults, &EngineSettings::empty()).expect("resolution");
        assert_eq!(config.jvm_options(), ["-Xms1024m", "-Xmx1024m"]);

        let mut overrides = EngineSettings::empty();
        overrides.jvm_option("-Xmx512m");
        let config = resolve(&defaults, &overrides).expect("resolution");
        assert_eq!(config.jvm_options(), ["-Xmx512m"]);
    }

    #[rstest]
    fn scalar_defaults_apply_when_unset(workdir: TempDir) {
        let config = resolve(&defaults_in(&workdir), &EngineSettings::empty()).expect("resolution");
        assert!(config.auto_fix_enabled());
        assert_eq!(config.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
        assert!(!config.cleanup_working_directory());
        assert!(config.working_directory().is_absolute());
        assert!(config.working_directory().is_dir());
        assert!(config.explicit_ports().values().all(Option::is_none));
    }

    #[rstest]
    fn port_properties_become_explicit_ports(workdir: TempDir) {
        let mut overrides = EngineSettings::empty();
        overrides
            .config_property("storage_port", 18000_i64)
            .config_property("ssl_storage_port", 18001_i64)
            .port(PortName::NativeTransport, 18002);

        let config = resolve(&defaults_in(&workdir), &overrides).expect("resolution");
        let ports = config.explicit_ports();
        assert_eq!(ports.get(&PortName::Storage), Some(&Some(18000)));
        assert_eq!(ports.get(&PortName::StorageSsl), Some(&Some(18001)));
        assert_eq!(ports.get(&PortName::NativeTransport), Some(&Some(18002)));
    }

    #[rstest]
    fn storage_port_override_replaces_fixed_test_port(workdir: TempDir) {
        let mut defaults = defaults_in(&workdir);
        defaults.default_test_settings();
        let mut overrides = EngineSettings::empty();
        overrides.config_property("storage_port", 18000_i64);

        let config = resolve(&defaults, &overrides).expect("resolution");
        let ports = config.explicit_ports();
        assert_eq!(ports.get(&PortName::Storage), Some(&Some(18000)));
        assert_eq!(ports.get(&PortName::NativeTransport), Some(&Some(9042)));
    }

    #[rstest]
    fn storage_port_set_after_test_settings_wins(workdir: TempDir) {
        let mut defaults = defaults_in(&workdir);
        defaults
            .default_test_settings()
            .config_property("storage_port", 18000_i64);

        let config = resolve(&defaults, &EngineSettings::empty()).expect("resolution");
        assert_eq!(
            config.explicit_ports().get(&PortName::Storage),
            Some(&Some(18000))
        );
    }

    #[rstest]
    fn duplicate_ports_fail_fast(workdir: TempDir) {
        let mut overrides = EngineSettings::empty();
        overrides
            .port(PortName::Storage, 18000)
            .port(PortName::NativeTransport, 18000);

        let error = resolve(&defaults_in(&workdir), &overrides).expect_err("duplicate ports");
        assert!(matches!(
            error,
            ConfigError::DuplicatePort {
                first: PortName::Storage,
                second: PortName::NativeTransport,
                port: 18000,
            }
        ));
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-5)]
    #[case::too_large(70_000)]
    fn out_of_range_port_properties_fail(workdir: TempDir, #[case] value: i64) {
        let mut overrides = EngineSettings::empty();
        overrides.config_property("native_transport_port", value);
        let error = resolve(&defaults_in(&workdir), &overrides).expect_err("bad port");
        assert!(matches!(
            error,
            ConfigError::PortOutOfRange { name: PortName::NativeTransport, value: v } if v == value
        ));
    }

    #[rstest]
    fn non_integer_port_property_fails(workdir: TempDir) {
        let mut overrides = EngineSettings::empty();
        overrides.config_property("storage_port", "seven thousand");
        let error = resolve(&defaults_in(&workdir), &overrides).expect_err("bad port");
        assert!(matches!(error, ConfigError::InvalidPortProperty { .. }));
    }

    #[rstest]
    fn reserved_keys_only_rejected_with_auto_fix(workdir: TempDir) {
        let mut overrides = EngineSettings::empty();
        overrides.system_property("java.security.manager", "allow");
        let error = resolve(&defaults_in(&workdir), &overrides).expect_err("reserved key");
        assert!(matches!(error, ConfigError::ReservedKey { ref key } if key == "java.security.manager"));

        overrides.auto_fix(false);
        resolve(&defaults_in(&workdir), &overrides).expect("auto-fix disabled");
    }

    #[cfg(unix)]
    #[rstest]
    fn unwritable_working_directory_is_reported(workdir: TempDir) {
        use std::os::unix::fs::PermissionsExt;

        // Root bypasses permission bits.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let locked = workdir.path().join("locked");
        fs::create_dir(&locked).expect("create locked dir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).expect("lock dir");

        let mut overrides = EngineSettings::empty();
        overrides.working_directory(&locked);
        let result = resolve(&EngineSettings::baseline(), &overrides);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock dir");
        assert!(matches!(result, Err(ConfigError::WorkingDirectory { .. })));
    }
}
