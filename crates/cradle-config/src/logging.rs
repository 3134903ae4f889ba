use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the binaries render their diagnostics on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event, for CI log collectors.
    #[default]
    Json,
    /// Single line human-readable events.
    Compact,
    /// Compact on an interactive terminal, JSON everywhere else.
    Auto,
}

impl LogFormat {
    /// Settles [`LogFormat::Auto`] against the kind of sink in use.
    #[must_use]
    pub const fn for_sink(self, interactive: bool) -> Self {
        match self {
            Self::Auto if interactive => Self::Compact,
            Self::Auto => Self::Json,
            concrete => concrete,
        }
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
