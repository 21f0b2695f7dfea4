//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// elcov: coverage for multi-process Electron apps
#[derive(Parser, Debug)]
#[command(name = "elcov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Instrument a source tree and package it as an asar archive
    Instrument(InstrumentArgs),

    /// Merge saved coverage snapshots and write reports
    Report(ReportArgs),
}

/// Arguments for the instrument command
#[derive(Parser, Debug)]
pub struct InstrumentArgs {
    /// Directory containing the application sources
    #[arg(long, value_name = "DIR")]
    pub input_path: PathBuf,

    /// Archive to create
    #[arg(long, value_name = "FILE")]
    pub output_path: PathBuf,

    /// Global object the counters are stored under
    #[arg(long, value_name = "NAME", default_value = "__coverage__")]
    pub coverage_variable: String,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Collector options file (JSON, camelCase keys)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report directory; snapshots are read from `<DIR>/data`
    #[arg(long, value_name = "DIR")]
    pub output_path: Option<PathBuf>,

    /// Library root scanned for files that never loaded
    #[arg(long, value_name = "DIR")]
    pub lib_path: Option<PathBuf>,

    /// Report format (lcov, json, json-summary, cobertura, text-summary)
    #[arg(long = "format", value_name = "ID")]
    pub formats: Vec<String>,

    /// Coverage map of the coordinating process (JSON)
    #[arg(long, value_name = "FILE")]
    pub live: Option<PathBuf>,
}

/// Color output argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
