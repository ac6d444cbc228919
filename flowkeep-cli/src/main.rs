use std::process;

use clap::CommandFactory;
use flowkeep_cli::cli::Cli;
use flowkeep_cli::commands;
use flowkeep_cli::error::handle_cli_result;
use flowkeep_cli::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse_args();

    let Some(command) = cli.command else {
        let code = match Cli::command().print_help() {
            Ok(()) => EXIT_SUCCESS,
            Err(_) => EXIT_ERROR,
        };
        process::exit(code);
    };

    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::TRACE
    } else {
        Level::WARN
    };

    // RUST_LOG, when set, takes precedence over the flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(log_level.into()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = commands::load_config(cli.root).and_then(|config| {
        tracing::debug!("Using store at {}", config.root.display());
        commands::run(command, &config)
    });

    process::exit(handle_cli_result(result));
}
