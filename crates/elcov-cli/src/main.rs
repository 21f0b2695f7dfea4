//! elcov CLI: coverage for multi-process Electron apps
//!
//! ## Usage
//!
//! ```bash
//! elcov instrument --input-path app/lib --output-path out/app.asar
//! elcov report --output-path coverage --lib-path app/lib --format lcov
//! ```

use clap::Parser;
use elcov_cli::{handlers, Cli, CliConfig, CliResult, Commands, Verbosity};
use std::error::Error;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(&config);

    match run(&config, &cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CliConfig, command: &Commands) -> CliResult<()> {
    match command {
        Commands::Instrument(args) => handlers::execute_instrument(config, args).map(|_| ()),
        Commands::Report(args) => handlers::execute_report(config, args).map(|_| ()),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
}

fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.color.should_color())
        .with_writer(std::io::stderr)
        .init();
}
