use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resolve::ConfigError;

/// Logical network ports bound by the managed engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum PortName {
    /// Inter-node storage traffic.
    #[serde(rename = "storage")]
    Storage,
    /// Encrypted inter-node storage traffic.
    #[serde(rename = "storage.ssl")]
    StorageSsl,
    /// Client protocol listener.
    #[serde(rename = "native.transport")]
    NativeTransport,
}

impl PortName {
    /// Every logical port the engine requires.
    pub const ALL: [Self; 3] = [Self::Storage, Self::StorageSsl, Self::NativeTransport];

    /// Symbolic name used in settings and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::StorageSsl => "storage.ssl",
            Self::NativeTransport => "native.transport",
        }
    }

    /// Engine configuration key carrying this port.
    #[must_use]
    pub const fn config_key(self) -> &'static str {
        match self {
            Self::Storage => "storage_port",
            Self::StorageSsl => "ssl_storage_port",
            Self::NativeTransport => "native_transport_port",
        }
    }

    /// Port the engine binds when left unconfigured.
    #[must_use]
    pub const fn engine_default(self) -> u16 {
        match self {
            Self::Storage => 7000,
            Self::StorageSsl => 7001,
            Self::NativeTransport => 9042,
        }
    }

    /// Key under which the allocated port is published to units of work.
    #[must_use]
    pub const fn fact_key(self) -> &'static str {
        match self {
            Self::Storage => "cassandra.storage.port",
            Self::StorageSsl => "cassandra.storage.port.ssl",
            Self::NativeTransport => "cassandra.native.transport.port",
        }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for PortName {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == normalised || name.config_key() == normalised)
            .ok_or(ConfigError::UnknownPort { name: normalised })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("storage", PortName::Storage)]
    #[case("storage.ssl", PortName::StorageSsl)]
    #[case("ssl_storage_port", PortName::StorageSsl)]
    #[case(" Native.Transport ", PortName::NativeTransport)]
    fn parses_symbolic_and_config_names(#[case] input: &str, #[case] expected: PortName) {
        assert_eq!(input.parse::<PortName>().expect("known port"), expected);
    }

    #[test]
    fn rejects_unknown_port_names() {
        let error = "jmx".parse::<PortName>().expect_err("unknown port");
        assert!(matches!(error, ConfigError::UnknownPort { ref name } if name == "jmx"));
    }
}
