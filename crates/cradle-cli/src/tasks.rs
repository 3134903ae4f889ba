//! Tasks run as child processes while the engine is up.
//!
//! Each task sees the published facts as environment variables, for example
//! `CASSANDRA_NATIVE_TRANSPORT_PORT`.

use std::process::Command;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use cradle::{PublishedFacts, TaskError, UnitOfWork};

const TASKS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::tasks");

/// Name given to the trailing `-- COMMAND` task.
pub(crate) const PROGRAM_TASK_NAME: &str = "command";

/// A `--task` value that could not be parsed.
#[derive(Debug, Error)]
#[error("expected NAME=COMMAND, got '{input}'")]
pub(crate) struct TaskSpecError {
    input: String,
}

/// A named shell command, run through `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShellTask {
    pub(crate) name: String,
    pub(crate) command: String,
}

impl FromStr for ShellTask {
    type Err = TaskSpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || TaskSpecError {
            input: input.to_owned(),
        };
        let (name, command) = input.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() || command.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_owned(),
            command: command.to_owned(),
        })
    }
}

impl ShellTask {
    pub(crate) fn into_unit(self) -> UnitOfWork {
        let Self { name, command } = self;
        let label = name.clone();
        UnitOfWork::new(name, move |facts| {
            let mut shell = Command::new("sh");
            shell.arg("-c").arg(&command);
            run_process(shell, &label, facts)
        })
    }
}

/// The trailing program, run directly with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProgramTask {
    program: String,
    arguments: Vec<String>,
}

impl ProgramTask {
    /// Returns `None` when no trailing command was given.
    pub(crate) fn new(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            arguments: argv.collect(),
        })
    }

    pub(crate) fn into_unit(self) -> UnitOfWork {
        UnitOfWork::new(PROGRAM_TASK_NAME, move |facts| {
            let mut command = Command::new(&self.program);
            command.args(&self.arguments);
            run_process(command, &self.program, facts)
        })
    }
}

fn run_process(
    mut command: Command,
    label: &str,
    facts: &PublishedFacts,
) -> Result<(), TaskError> {
    command.envs(facts.environment());
    debug!(target: TASKS_TARGET, task = label, "spawning task process");
    let status = command.status().map_err(|error| {
        TaskError::new(format!("failed to spawn '{label}': {error}")).with_source(error)
    })?;
    if status.success() {
        return Ok(());
    }
    let error = TaskError::new(format!("'{label}' exited with {status}"));
    Err(match status.code() {
        Some(code) => error.with_exit_code(code),
        None => error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("smoke=true", "smoke", "true")]
    #[case::keeps_equals("check=test \"$A\" = b", "check", "test \"$A\" = b")]
    #[case::trims_name(" it =cargo test", "it", "cargo test")]
    fn parses_task_specs(#[case] input: &str, #[case] name: &str, #[case] command: &str) {
        let task: ShellTask = input.parse().expect("task spec");
        assert_eq!(task.name, name);
        assert_eq!(task.command, command);
    }

    #[rstest]
    #[case::missing_separator("smoke")]
    #[case::empty_name("=true")]
    #[case::empty_command("smoke=  ")]
    fn rejects_malformed_task_specs(#[case] input: &str) {
        assert!(input.parse::<ShellTask>().is_err());
    }

    #[test]
    fn empty_trailing_command_yields_no_task() {
        assert!(ProgramTask::new(Vec::new()).is_none());
    }
}
