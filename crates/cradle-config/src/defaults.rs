use std::path::PathBuf;
use std::time::Duration;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Engine binary launched when none is configured.
pub const DEFAULT_ENGINE_BINARY: &str = "cassandra";

/// Readiness timeout used when settings leave it unset.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Build-scoped directory used when settings leave the working directory unset.
pub const DEFAULT_WORKING_DIRECTORY: &str = "target/cassandra";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned engine binary name.
pub fn default_engine_binary() -> String {
    DEFAULT_ENGINE_BINARY.to_string()
}

/// Working directory relative to the invoking build.
pub fn default_working_directory() -> PathBuf {
    PathBuf::from(DEFAULT_WORKING_DIRECTORY)
}
