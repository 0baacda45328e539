//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use lanecheck::reporter::ReportFormat;
use lanecheck::DragProtocol;
use std::path::PathBuf;

/// Lanecheck: run declarative UI-interaction suites against the pipeline board
#[derive(Parser, Debug)]
#[command(name = "lanecheck")]
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
    /// Run suites
    Run(RunArgs),

    /// Parse and validate suites without running them
    Validate(ValidateArgs),

    /// Write a starter suite and config file
    Init(InitArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite files or glob patterns (default: suites/**/*.yaml)
    pub files: Vec<String>,

    /// Only run tests whose name contains this pattern
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Number of parallel test jobs (0 = auto-detect)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Skip remaining tests after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Timeout in milliseconds for navigation, call awaits and assertions
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON fixture seeding the pipeline backend
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Config file (default: ./lanecheck.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Drag protocol the board listens for
    #[arg(long, value_enum)]
    pub dnd: Option<DndArg>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Suite files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Detect from the terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable summary
    Text,
    /// JSON document
    Json,
    /// JUnit XML
    Junit,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Junit => Self::Junit,
        }
    }
}

/// Drag protocol argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DndArg {
    /// dragstart / dragover / drop
    Native,
    /// mousedown / mousemove / mouseup
    Pointer,
}

impl From<DndArg> for DragProtocol {
    fn from(arg: DndArg) -> Self {
        match arg {
            DndArg::Native => Self::NativeDrag,
            DndArg::Pointer => Self::Pointer,
        }
    }
}
