//! CLI configuration
//!
//! Settings come from three layers: built-in defaults, an optional
//! `lanecheck.yaml`, then command-line flags.

use crate::error::{CliError, CliResult};
use lanecheck::reporter::ReportFormat;
use lanecheck::DragProtocol;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lanecheck.yaml";

/// Suite glob used when no files are given
pub const DEFAULT_SUITE_GLOB: &str = "suites/**/*.yaml";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Map `-q` / `-v` counts to a level
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Default tracing filter directive for this level
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

impl From<crate::commands::ColorArg> for ColorChoice {
    fn from(arg: crate::commands::ColorArg) -> Self {
        match arg {
            crate::commands::ColorArg::Auto => Self::Auto,
            crate::commands::ColorArg::Always => Self::Always,
            crate::commands::ColorArg::Never => Self::Never,
        }
    }
}

/// Contents of `lanecheck.yaml`; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Suite globs
    pub suites: Vec<String>,
    /// Parallel jobs
    pub jobs: Option<usize>,
    /// Stop after the first failure
    pub fail_fast: Option<bool>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Report format
    pub format: Option<ReportFormat>,
    /// Report file
    pub output: Option<PathBuf>,
    /// Fixture JSON
    pub fixture: Option<PathBuf>,
    /// Drag protocol the board listens for
    pub dnd: Option<DragProtocol>,
}

impl FileConfig {
    /// Parse from YAML
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or has unknown keys
    pub fn from_yaml(yaml: &str) -> CliResult<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| CliError::config(e.to_string()))
    }

    /// Load from `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> CliResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))
    }

    /// Load `explicit`, or `lanecheck.yaml` in the working directory if present
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is missing or any file is malformed
    pub fn discover(explicit: Option<&Path>) -> CliResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Effective CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Number of parallel jobs (0 = auto-detect)
    pub parallel_jobs: usize,
    /// Fail fast on first error
    pub fail_fast: bool,
    /// Timeout for navigation, awaits and assertions; session defaults when unset
    pub timeout_ms: Option<u64>,
    /// Report format
    pub format: ReportFormat,
    /// Report file; stdout when unset
    pub output: Option<PathBuf>,
    /// Fixture JSON; built-in board when unset
    pub fixture: Option<PathBuf>,
    /// Drag protocol the board listens for
    pub dnd: DragProtocol,
    /// Suite globs
    pub suites: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            parallel_jobs: 1,
            fail_fast: false,
            timeout_ms: None,
            format: ReportFormat::Text,
            output: None,
            fixture: None,
            dnd: DragProtocol::NativeDrag,
            suites: vec![DEFAULT_SUITE_GLOB.to_string()],
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set parallel jobs
    #[must_use]
    pub const fn with_parallel_jobs(mut self, jobs: usize) -> Self {
        self.parallel_jobs = jobs;
        self
    }

    /// Set fail fast
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Layer a config file over the current values
    #[must_use]
    pub fn merge_file(mut self, file: FileConfig) -> Self {
        if !file.suites.is_empty() {
            self.suites = file.suites;
        }
        if let Some(jobs) = file.jobs {
            self.parallel_jobs = jobs;
        }
        if let Some(fail_fast) = file.fail_fast {
            self.fail_fast = fail_fast;
        }
        if file.timeout_ms.is_some() {
            self.timeout_ms = file.timeout_ms;
        }
        if let Some(format) = file.format {
            self.format = format;
        }
        if file.output.is_some() {
            self.output = file.output;
        }
        if file.fixture.is_some() {
            self.fixture = file.fixture;
        }
        if let Some(dnd) = file.dnd {
            self.dnd = dnd;
        }
        self
    }

    /// Layer `run` flags over the current values
    #[must_use]
    pub fn merge_args(mut self, args: &crate::commands::RunArgs) -> Self {
        if !args.files.is_empty() {
            self.suites.clone_from(&args.files);
        }
        if let Some(jobs) = args.jobs {
            self.parallel_jobs = jobs;
        }
        self.fail_fast |= args.fail_fast;
        if args.timeout.is_some() {
            self.timeout_ms = args.timeout;
        }
        if let Some(format) = args.format {
            self.format = format.into();
        }
        if args.output.is_some() {
            self.output.clone_from(&args.output);
        }
        if args.fixture.is_some() {
            self.fixture.clone_from(&args.fixture);
        }
        if let Some(dnd) = args.dnd {
            self.dnd = dnd.into();
        }
        self
    }

    /// Get effective number of parallel jobs
    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        if self.parallel_jobs == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.parallel_jobs
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands, RunArgs};
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["lanecheck", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(false, 3), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(true, 2), Verbosity::Quiet);
        }

        #[test]
        fn test_predicates() {
            assert!(Verbosity::Quiet.is_quiet());
            assert!(Verbosity::Debug.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Debug.is_debug());
        }

        #[test]
        fn test_log_directive() {
            assert_eq!(Verbosity::Normal.log_directive(), "warn");
            assert_eq!(Verbosity::Debug.log_directive(), "debug");
        }
    }

    mod color_tests {
        use super::*;

        #[test]
        fn test_explicit_choices() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
        }
    }

    mod file_config_tests {
        use super::*;

        #[test]
        fn test_parse_all_keys() {
            let file = FileConfig::from_yaml(
                "suites: [e2e/*.yaml]\njobs: 4\nfail_fast: true\ntimeout_ms: 800\nformat: junit\noutput: out/report.xml\ndnd: pointer\n",
            )
            .unwrap();
            assert_eq!(file.suites, vec!["e2e/*.yaml".to_string()]);
            assert_eq!(file.jobs, Some(4));
            assert_eq!(file.format, Some(ReportFormat::Junit));
            assert_eq!(file.dnd, Some(DragProtocol::Pointer));
        }

        #[test]
        fn test_unknown_key_rejected() {
            let err = FileConfig::from_yaml("paralel: 4\n").unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_discover_explicit_missing() {
            let dir = tempfile::tempdir().unwrap();
            let missing = dir.path().join("nope.yaml");
            assert!(FileConfig::discover(Some(&missing)).is_err());
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = CliConfig::new();
            assert_eq!(config.parallel_jobs, 1);
            assert_eq!(config.timeout_ms, None);
            assert_eq!(config.suites, vec![DEFAULT_SUITE_GLOB.to_string()]);
            assert_eq!(config.dnd, DragProtocol::NativeDrag);
        }

        #[test]
        fn test_args_override_file() {
            let file = FileConfig {
                jobs: Some(2),
                timeout_ms: Some(900),
                format: Some(ReportFormat::Json),
                ..FileConfig::default()
            };
            let config = CliConfig::new()
                .merge_file(file)
                .merge_args(&run_args(&["--jobs", "8", "--format", "junit"]));
            assert_eq!(config.parallel_jobs, 8);
            assert_eq!(config.timeout_ms, Some(900));
            assert_eq!(config.format, ReportFormat::Junit);
        }

        #[test]
        fn test_files_replace_default_glob() {
            let config = CliConfig::new().merge_args(&run_args(&["a.yaml", "b.yaml"]));
            assert_eq!(config.suites, vec!["a.yaml".to_string(), "b.yaml".to_string()]);
        }

        #[test]
        fn test_effective_jobs_auto() {
            assert!(CliConfig::new().with_parallel_jobs(0).effective_jobs() >= 1);
            assert_eq!(CliConfig::new().with_parallel_jobs(3).effective_jobs(), 3);
        }
    }
}
