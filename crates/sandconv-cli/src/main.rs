//! Sandconv CLI - Command-line front end for sandboxed archive conversion.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio::runtime::Runtime;

use crate::cli::Cli;
use crate::cli::Commands;
use crate::output::OutputFormatter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli);

    let formatter = output::create_formatter(cli.command.operation(), cli.json, cli.verbose, cli.quiet);

    match run(&cli, &*formatter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            formatter.format_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, formatter: &dyn OutputFormatter) -> Result<()> {
    match &cli.command {
        Commands::Convert(args) => runtime()?.block_on(commands::convert::execute(args, formatter)),
        Commands::Validate(args) => commands::validate::execute(args, formatter),
        Commands::Probe(args) => runtime()?.block_on(commands::probe::execute(args, formatter)),
        Commands::Sweep(args) => commands::sweep::execute(args, formatter),
        Commands::Completion { shell } => {
            commands::completion::execute(*shell);
            Ok(())
        }
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
