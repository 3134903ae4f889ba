//! CLI entrypoint for the cradle lifecycle manager.
//!
//! The binary delegates to [`cradle_cli::run`], which loads layered
//! configuration, starts the engine, runs the requested tasks, and stops the
//! engine again.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    cradle_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
