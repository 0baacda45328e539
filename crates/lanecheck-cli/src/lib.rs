//! Lanecheck CLI library
//!
//! Command-line front end for running declarative lanecheck suites against
//! the pipeline board.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod init;
pub mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, DndArg, FormatArg, InitArgs, RunArgs, ValidateArgs};
pub use config::{
    CliConfig, ColorChoice, FileConfig, Verbosity, DEFAULT_CONFIG_FILE, DEFAULT_SUITE_GLOB,
};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
pub use runner::{expand_patterns, load_suites, validate_files, SuiteRunner};
