//! Suite discovery and execution

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use lanecheck::pipeline::{pipeline_session, BoardFixture};
use lanecheck::reporter::{ReportFormat, RunReport};
use lanecheck::script::SuiteFile;
use lanecheck::{SessionConfig, TestHarness};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Expand file names and glob patterns into a sorted, de-duplicated list
///
/// # Errors
///
/// Returns error if a pattern is malformed or nothing matches at all
pub fn expand_patterns(patterns: &[String]) -> CliResult<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let literal = Path::new(pattern);
        if literal.is_file() {
            files.insert(literal.to_path_buf());
            continue;
        }
        let paths = glob::glob(pattern)
            .map_err(|e| CliError::invalid_argument(format!("bad pattern {pattern:?}: {e}")))?;
        let before = files.len();
        files.extend(paths.filter_map(Result::ok).filter(|p| p.is_file()));
        if files.len() == before {
            tracing::warn!(pattern = %pattern, "pattern matched no suite files");
        }
    }
    if files.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no suite files matched {}",
            patterns.join(", ")
        )));
    }
    Ok(files.into_iter().collect())
}

/// Load and validate every suite file
///
/// # Errors
///
/// Returns the first file that fails to load or validate
pub fn load_suites(files: &[PathBuf]) -> CliResult<Vec<(PathBuf, SuiteFile)>> {
    files
        .iter()
        .map(|path| Ok((path.clone(), SuiteFile::load(path)?)))
        .collect()
}

/// Suite runner
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a new suite runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Session settings derived from the configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let base = SessionConfig::new();
        match self.config.timeout_ms {
            Some(ms) => base.with_timeout(ms),
            None => base,
        }
    }

    fn harness(&self) -> TestHarness {
        let harness = TestHarness::new().with_jobs(self.config.effective_jobs());
        if self.config.fail_fast {
            harness.with_fail_fast()
        } else {
            harness
        }
    }

    fn fixture(&self) -> CliResult<BoardFixture> {
        match &self.config.fixture {
            Some(path) => Ok(BoardFixture::load(path)?),
            None => Ok(BoardFixture::default()),
        }
    }

    /// Run every configured suite, optionally keeping only tests matching `filter`
    ///
    /// # Errors
    ///
    /// Returns error if suites or the fixture cannot be loaded; test failures
    /// are reported in the returned [`RunReport`]
    pub fn run(&mut self, filter: Option<&str>) -> CliResult<RunReport> {
        let files = expand_patterns(&self.config.suites)?;
        let suites = load_suites(&files)?;
        let fixture = self.fixture()?;
        let session_config = self.session_config();
        let dnd = self.config.dnd;
        let harness = self.harness();
        let factory = move || pipeline_session(fixture.clone(), dnd, session_config.clone());

        tracing::info!(
            suites = suites.len(),
            jobs = self.config.effective_jobs(),
            dnd = %dnd,
            "starting run"
        );

        let mut report = RunReport::new();
        self.reporter
            .start_progress(suites.len() as u64, "running suites");
        for (path, file) in &suites {
            self.reporter.set_message(&path.display().to_string());
            let mut suite = file.to_suite();
            if let Some(pattern) = filter {
                suite = suite.filtered(pattern);
            }
            let results = harness.run(&suite, &factory);
            self.reporter.suite_results(&results);
            self.reporter.increment(1);
            let stop = self.config.fail_fast && !results.all_passed();
            report.add(results);
            if stop {
                tracing::warn!("fail-fast: skipping remaining suites");
                break;
            }
        }
        self.reporter.finish();
        self.reporter.summary(
            report.passed_count(),
            report.failed_count(),
            report.skipped_count(),
            report.total_duration(),
        );
        Ok(report)
    }

    /// Write `report` to the configured file, or print it to stdout
    ///
    /// Text reports go to stdout only when an output file is not set and the
    /// terminal output is quiet, since the progress lines already show them.
    ///
    /// # Errors
    ///
    /// Returns error if rendering or writing fails
    pub fn emit(&self, report: &RunReport) -> CliResult<()> {
        let format = self.config.format;
        if let Some(path) = &self.config.output {
            report
                .write(path, format)
                .map_err(|e| CliError::report_generation(e.to_string()))?;
            self.reporter
                .info(&format!("report written to {}", path.display()));
            return Ok(());
        }
        if format != ReportFormat::Text || self.config.verbosity.is_quiet() {
            let rendered = report
                .render(format)
                .map_err(|e| CliError::report_generation(e.to_string()))?;
            print!("{rendered}");
        }
        Ok(())
    }
}

/// Validate suite files without running them; returns the total test count
///
/// # Errors
///
/// Returns the first invalid file
pub fn validate_files(patterns: &[String], reporter: &ProgressReporter) -> CliResult<usize> {
    let files = expand_patterns(patterns)?;
    let mut total = 0;
    for path in &files {
        match SuiteFile::load(path) {
            Ok(file) => {
                reporter.success(&format!(
                    "{} ({} tests)",
                    path.display(),
                    file.test_count()
                ));
                total += file.test_count();
            }
            Err(e) => {
                reporter.failure(&e.to_string());
                return Err(e.into());
            }
        }
    }
    Ok(total)
}
