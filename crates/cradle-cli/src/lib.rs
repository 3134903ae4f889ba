//! Command-line host for the cradle lifecycle manager.
//!
//! `cradle [CONFIG FLAGS] run [ENGINE FLAGS] --task NAME=COMMAND ... [-- COMMAND]`
//! loads layered configuration, starts the engine, runs every task with the
//! published facts in its environment, and stops the engine whatever the
//! tasks did. The exit code is zero on success, the first failing task's exit
//! code when it has one, and one otherwise.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use cradle::{CommandEngine, Engine, LifecycleBinder, ProcessSupervisor, telemetry};
use cradle_config::{Config, resolve};

mod cli;
mod config;
mod errors;
mod tasks;

use cli::{Cli, CliCommand, RunArgs};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// CLI flags recognised by the configuration loader, and whether each takes
/// a value.
///
/// MAINTENANCE: keep in sync with the fields of `cradle_config::Config`.
const CONFIG_CLI_FLAGS: &[(&str, bool)] = &[
    ("--config-path", true),
    ("--log-filter", true),
    ("--log-format", true),
    ("--engine-binary", true),
    ("--working-directory", true),
    ("--startup-timeout-secs", true),
    ("--jvm-auto-fix", true),
    ("--baseline", true),
    ("--port-mode", true),
    ("--cleanup", false),
];

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with(args, stdout, stderr, &OrthoConfigLoader, |config: &Config| {
        ProcessSupervisor::new(CommandEngine::new(config.engine_binary()))
    })
}

/// Runs the CLI with a custom configuration loader and supervisor.
pub(crate) fn run_with<I, W, E, L, G, F>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    supervisor_for: F,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    G: Engine,
    F: FnOnce(&Config) -> ProcessSupervisor<G>,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = prepare_cli_arguments(&args, &split);

    let result = Cli::try_parse_from(cli_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| loader.load(&split.config_arguments).map(|config| (cli, config)))
        .and_then(|(cli, config)| {
            telemetry::initialise(&config)?;
            match cli.command {
                CliCommand::Run(run_args) => {
                    run_tasks(&config, run_args, supervisor_for(&config))
                }
            }
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            let _ = write!(stdout, "{error}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            error.exit_code()
        }
    }
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if let Some(rest) = args.get(split.command_start..) {
        cli_arguments.extend(rest.iter().cloned());
    }
    cli_arguments
}

fn run_tasks<G: Engine>(
    config: &Config,
    args: RunArgs,
    mut supervisor: ProcessSupervisor<G>,
) -> Result<(), AppError> {
    let defaults = config.default_settings();
    let mut overrides = config.override_settings();
    args.apply_to(&mut overrides);

    let mut binder = LifecycleBinder::new();
    for unit in args.into_units() {
        binder.bind(unit)?;
    }
    if binder.is_empty() {
        return Err(AppError::NoTasks);
    }
    let effective = resolve(&defaults, &overrides)?;
    info!(
        target: CLI_TARGET,
        tasks = binder.len(),
        dir = %effective.working_directory().display(),
        "running tasks against the engine"
    );
    let report = binder.run(&mut supervisor, effective);
    let _cleanup = supervisor.cleanup();
    report.result().map_err(AppError::from)
}
