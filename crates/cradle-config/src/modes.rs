use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether the engine's JVM flags may be patched for the detected runtime.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AutoFixMode {
    /// Apply the auto-fix policy.
    #[default]
    Enabled,
    /// Launch with the flags exactly as configured.
    Disabled,
}

impl AutoFixMode {
    /// Returns `true` when the policy applies.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Baseline settings a binary seeds before applying its own overrides.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Baseline {
    /// The production-like defaults.
    #[default]
    Standard,
    /// The fast single-node test profile.
    Test,
}
