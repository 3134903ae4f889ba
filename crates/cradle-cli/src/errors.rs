//! Error types for the CLI runtime.

use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;

use cradle::{BindError, RunError, TelemetryError};
use cradle_config::ConfigError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("invalid engine settings: {0}")]
    Settings(#[from] ConfigError),
    #[error("invalid task list: {0}")]
    Bind(#[from] BindError),
    #[error("no tasks given; pass --task NAME=COMMAND or a trailing -- COMMAND")]
    NoTasks,
    #[error("{0}")]
    Run(#[from] RunError),
}

impl AppError {
    /// Exit code reported for this error.
    ///
    /// A task that exited non-zero passes its own code through; everything
    /// else maps to a generic failure.
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::Run(RunError::Task { source, .. }) => source
                .exit_code()
                .map_or(ExitCode::FAILURE, exit_code_from_status),
            _ => ExitCode::FAILURE,
        }
    }
}

pub(crate) fn exit_code_from_status(status: i32) -> ExitCode {
    u8::try_from(status)
        .ok()
        .filter(|code| *code != 0)
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
