//! `lanecheck init`: starter suite and config file

use crate::config::DEFAULT_CONFIG_FILE;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use std::path::{Path, PathBuf};

/// Starter suite written to `suites/board.yaml`
pub const STARTER_SUITE: &str = r#"name: Board smoke test

before_each:
  - action: goto
    path: /positions/1
    ready: '[data-testid="stage-column"]'

tests:
  - name: shows one column per interview step
    steps:
      - action: expect
        target: '[data-testid="stage-column"]'
        count: { greater_than: 0 }
      - action: expect
        target: '[data-testid="stage-column"]'
        visible: true
        each: true

  - name: moving a card saves its new stage
    steps:
      - action: intercept
        method: PUT
        url: "**/candidates/*"
        alias: updateCandidate
      - action: drag
        from: { selector: '[data-testid="candidate-card"]', nth: 0 }
        to: { selector: '[data-testid="stage-column"]', nth: 1 }
      - action: wait
        alias: "@updateCandidate"
        method: PUT
        body_keys: [applicationId, currentInterviewStep]
        status: 200
      - action: no_console_errors
"#;

/// Starter config written to `lanecheck.yaml`
pub const STARTER_CONFIG: &str = "# lanecheck configuration; command-line flags take precedence\n\
suites:\n  - suites/**/*.yaml\n\
jobs: 1\n\
fail_fast: false\n\
format: text\n\
dnd: native\n";

/// Write the starter files under `root`; returns the paths written
///
/// Existing files are kept unless `force` is set.
///
/// # Errors
///
/// Returns error if a directory or file cannot be written
pub fn init_project(root: &Path, force: bool, reporter: &ProgressReporter) -> CliResult<Vec<PathBuf>> {
    let suite = root.join("suites").join("board.yaml");
    let config = root.join(DEFAULT_CONFIG_FILE);
    let mut written = Vec::new();

    for (path, content) in [(suite, STARTER_SUITE), (config, STARTER_CONFIG)] {
        if path.exists() && !force {
            reporter.warning(&format!("{} exists, keeping it (use --force)", path.display()));
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        reporter.success(&format!("created {}", path.display()));
        written.push(path);
    }
    Ok(written)
}
