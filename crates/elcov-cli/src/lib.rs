//! elcov CLI Library
//!
//! Command-line interface for instrumenting Electron app sources and merging
//! the coverage their processes leave behind.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;

pub use commands::{Cli, ColorArg, Commands, InstrumentArgs, ReportArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
