//! GeoCat CLI - Command-line interface
//!
//! Drives the import pipeline against a `.geocat` workspace on disk.

mod cli;
mod commands;
mod config;
mod dry_run;
mod errors;
mod output;
mod output_types;
mod progress;
mod storage;

use clap::Parser;
use cli::Cli;
use errors::CliError;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            CliError::new("Cannot start the async runtime").with_context(e.to_string()).display();
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(commands::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast::<CliError>() {
                Ok(cli_error) => cli_error.display(),
                Err(other) => errors::from_anyhow(other).display(),
            }
            ExitCode::FAILURE
        }
    }
}
