//! CLI argument definitions for the cradle binary.
//!
//! Layered configuration flags (`--config-path`, `--engine-binary`, and so
//! on) are split off before these definitions see the arguments; see
//! [`crate::config`].

use clap::{Args, Parser, Subcommand};

use cradle::UnitOfWork;
use cradle_config::{ConfigError, EngineSettings, PortName, PropertyValue, parse_assignment};

use crate::tasks::{ProgramTask, ShellTask};

/// Command-line interface for the cradle lifecycle manager.
#[derive(Parser, Debug)]
#[command(
    name = "cradle",
    version,
    about = "Runs tasks against an ephemeral Cassandra engine",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Structured subcommands for the cradle CLI.
#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Starts the engine, runs the tasks in order, and stops the engine.
    Run(RunArgs),
}

/// Engine overrides and tasks for a single run.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// JVM flag passed to the engine; replaces the default flags when given.
    #[arg(long = "jvm-option", value_name = "FLAG", allow_hyphen_values = true)]
    pub(crate) jvm_options: Vec<String>,
    /// Engine configuration entry.
    #[arg(long = "config-property", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub(crate) config_properties: Vec<(String, PropertyValue)>,
    /// JVM system property for the engine process.
    #[arg(long = "system-property", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub(crate) system_properties: Vec<(String, PropertyValue)>,
    /// Explicit port for a logical name: storage, storage.ssl, or
    /// native.transport.
    #[arg(long = "port", value_name = "NAME=PORT", value_parser = parse_port)]
    pub(crate) ports: Vec<(PortName, u16)>,
    /// Shell command run while the engine is up, named for reporting.
    #[arg(long = "task", value_name = "NAME=COMMAND")]
    pub(crate) tasks: Vec<ShellTask>,
    /// Program run after the named tasks.
    #[arg(last = true, value_name = "COMMAND")]
    pub(crate) command: Vec<String>,
}

impl RunArgs {
    /// Layers the flag overrides on top of `settings`.
    pub(crate) fn apply_to(&self, settings: &mut EngineSettings) {
        for option in &self.jvm_options {
            settings.jvm_option(option.as_str());
        }
        for (key, value) in &self.config_properties {
            settings.config_property(key.as_str(), value.clone());
        }
        for (key, value) in &self.system_properties {
            settings.system_property(key.as_str(), value.clone());
        }
        for (name, port) in &self.ports {
            settings.port(*name, *port);
        }
    }

    /// Units of work in the order they were given.
    pub(crate) fn into_units(self) -> Vec<UnitOfWork> {
        let mut units: Vec<UnitOfWork> =
            self.tasks.into_iter().map(ShellTask::into_unit).collect();
        if let Some(program) = ProgramTask::new(self.command) {
            units.push(program.into_unit());
        }
        units
    }
}

/// Parses a `NAME=PORT` assignment.
pub(crate) fn parse_port(input: &str) -> Result<(PortName, u16), ConfigError> {
    let invalid = || ConfigError::InvalidAssignment {
        input: input.to_owned(),
    };
    let (name, value) = input.split_once('=').ok_or_else(invalid)?;
    let name: PortName = name.trim().parse()?;
    let value: i64 = value.trim().parse().map_err(|_| invalid())?;
    let port = u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(ConfigError::PortOutOfRange { name, value })?;
    Ok((name, port))
}
