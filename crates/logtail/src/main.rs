mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::fs::OpenOptions;
use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match init_tracing(&cli.global) {
        Ok(guard) => {
            let result = run(cli).await;
            // Flush file logs before a possible `exit`.
            drop(guard);
            result
        }
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Install the global subscriber. Logs go to stderr, or to `--log-file`
/// through a non-blocking writer whose guard must outlive the run.
fn init_tracing(global: &cli::GlobalOpts) -> Result<Option<WorkerGuard>, CliError> {
    let level = match (global.verbose, global.quiet) {
        (0, true) => "error",
        (0, false) => "warn",
        (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match global.log_file.as_deref() {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

fn open_log_file(path: &Path) -> Result<std::fs::File, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Tail(args) => commands::tail::handle(args, &cli.global).await,

        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "logtail", &mut std::io::stdout());
            Ok(())
        }
    }
}
