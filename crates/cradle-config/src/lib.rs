//! Shared configuration for the cradle workspace.
//!
//! Two layers live here. [`Config`] is the layered settings surface for the
//! binaries, loaded by `ortho-config` from defaults, an optional TOML file,
//! `CRADLE_*` environment variables, and command-line flags (in ascending
//! precedence). [`EngineSettings`] and [`resolve`] describe a single engine
//! start: consumers seed defaults, apply overrides, and resolve them into an
//! immutable [`EffectiveConfig`].

use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod modes;
mod ports;
mod property;
mod resolve;
mod settings;

pub use defaults::{
    DEFAULT_ENGINE_BINARY, DEFAULT_LOG_FILTER, DEFAULT_STARTUP_TIMEOUT, DEFAULT_WORKING_DIRECTORY,
    default_engine_binary, default_log_filter, default_log_filter_string, default_log_format,
    default_working_directory,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use modes::{AutoFixMode, Baseline};
pub use ports::PortName;
pub use property::{PropertyMap, PropertyValue, parse_assignment};
pub use resolve::{AUTO_FIX_RESERVED_KEYS, ConfigError, EffectiveConfig, resolve, validate_ports};
pub use settings::{EngineSettings, PortMode, TEST_STARTUP_TIMEOUT};

/// Layered settings consumed by the cradle binaries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CRADLE")]
pub struct Config {
    /// Tracing filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Structured log output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Engine executable, resolved through `PATH` when not absolute.
    #[ortho_config(default = defaults::default_engine_binary())]
    pub engine_binary: String,
    /// Working directory override.
    pub working_directory: Option<PathBuf>,
    /// Readiness timeout override, in seconds.
    pub startup_timeout_secs: Option<u64>,
    /// JVM auto-fix toggle.
    #[ortho_config(default = AutoFixMode::Enabled)]
    pub jvm_auto_fix: AutoFixMode,
    /// Baseline seeded before overrides.
    #[ortho_config(default = Baseline::Standard)]
    pub baseline: Baseline,
    /// Port selection used by the test baseline.
    #[ortho_config(default = PortMode::Fixed)]
    pub port_mode: PortMode,
    /// Remove the working directory once the engine stops.
    #[ortho_config(default = false)]
    pub cleanup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            engine_binary: default_engine_binary(),
            working_directory: None,
            startup_timeout_secs: None,
            jvm_auto_fix: AutoFixMode::default(),
            baseline: Baseline::default(),
            port_mode: PortMode::default(),
            cleanup: false,
        }
    }
}

impl Config {
    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Engine executable.
    #[must_use]
    pub fn engine_binary(&self) -> &str {
        self.engine_binary.as_str()
    }

    /// Builds the defaults layer selected by [`Config::baseline`].
    #[must_use]
    pub fn default_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::baseline();
        if matches!(self.baseline, Baseline::Test) {
            settings.default_test_settings_with(self.port_mode);
        }
        settings
    }

    /// Builds the override layer carried by the scalar settings.
    #[must_use]
    pub fn override_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::empty();
        settings.auto_fix(self.jvm_auto_fix.is_enabled());
        if let Some(path) = &self.working_directory {
            settings.working_directory(path);
        }
        if let Some(secs) = self.startup_timeout_secs {
            settings.startup_timeout(Duration::from_secs(secs));
        }
        if self.cleanup {
            settings.cleanup_working_directory(true);
        }
        settings
    }
}
