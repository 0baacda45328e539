//! Lanecheck CLI: run declarative UI-interaction suites
//!
//! ## Usage
//!
//! ```bash
//! lanecheck run                                  # suites/**/*.yaml
//! lanecheck run suites/board.yaml --jobs 4       # parallel tests
//! lanecheck run --format junit -o report.xml     # CI report
//! lanecheck validate suites/*.yaml               # schema check only
//! lanecheck init                                 # starter files
//! ```

use clap::Parser;
use lanecheck_cli::{
    init, logging, validate_files, Cli, CliConfig, CliError, CliResult, Commands, FileConfig,
    ProgressReporter, RunArgs, SuiteRunner, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    logging::init(verbosity);

    let config = CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(cli.color.into());

    match cli.command {
        Commands::Run(args) => run_suites(config, &args),
        Commands::Validate(args) => {
            let reporter =
                ProgressReporter::new(config.color.should_color(), verbosity.is_quiet());
            let total = validate_files(&args.files, &reporter)?;
            reporter.info(&format!("{total} tests valid"));
            Ok(())
        }
        Commands::Init(args) => {
            let reporter =
                ProgressReporter::new(config.color.should_color(), verbosity.is_quiet());
            init::init_project(&args.path, args.force, &reporter)?;
            Ok(())
        }
    }
}

fn run_suites(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    let file = FileConfig::discover(args.config.as_deref())?;
    let config = config.merge_file(file).merge_args(args);
    tracing::debug!(?config, "effective configuration");

    let mut runner = SuiteRunner::new(config);
    let report = runner.run(args.filter.as_deref())?;
    runner.emit(&report)?;

    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::test_execution(format!(
            "{} of {} tests failed",
            report.failed_count(),
            report.total_count()
        )))
    }
}
