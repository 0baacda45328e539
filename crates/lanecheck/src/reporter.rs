//! Run reports: plain-text summary, JSON, and JUnit XML for CI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::harness::{SuiteResults, TestStatus};
use crate::result::LanecheckResult;

/// Output format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON document
    Json,
    /// JUnit XML
    Junit,
}

impl ReportFormat {
    /// Parse a format name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            "junit" | "xml" => Some(Self::Junit),
            _ => None,
        }
    }

    /// File extension for the format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Junit => "xml",
        }
    }
}

/// Results of every suite in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Suite results in run order
    pub suites: Vec<SuiteResults>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    /// Start an empty report stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            suites: Vec::new(),
        }
    }

    /// Add a suite's results
    pub fn add(&mut self, results: SuiteResults) {
        self.suites.push(results);
    }

    /// Get number of passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.suites.iter().map(SuiteResults::passed_count).sum()
    }

    /// Get number of failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.suites.iter().map(SuiteResults::failed_count).sum()
    }

    /// Get number of skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.suites.iter().map(SuiteResults::skipped_count).sum()
    }

    /// Get total test count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.suites.iter().map(SuiteResults::total).sum()
    }

    /// Check if no test failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.suites.iter().all(SuiteResults::all_passed)
    }

    /// Get total duration
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.suites.iter().map(|s| s.duration).sum()
    }

    /// Generate summary string
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!("{}/{} passed", self.passed_count(), self.total_count());
        if self.failed_count() > 0 {
            let _ = write!(line, ", {} failed", self.failed_count());
        }
        if self.skipped_count() > 0 {
            let _ = write!(line, ", {} skipped", self.skipped_count());
        }
        let _ = write!(line, " in {:.2}s", self.total_duration().as_secs_f64());
        line
    }

    /// Render in `format`
    pub fn render(&self, format: ReportFormat) -> LanecheckResult<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
            ReportFormat::Junit => Ok(self.render_junit()),
        }
    }

    /// Render and write to `output_path`
    ///
    /// # Errors
    ///
    /// Returns error if rendering or file writing fails
    pub fn write(&self, output_path: &Path, format: ReportFormat) -> LanecheckResult<()> {
        let content = self.render(format)?;
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, content)?;
        tracing::info!(path = %output_path.display(), ?format, "report written");
        Ok(())
    }

    /// Render the plain-text report
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for suite in &self.suites {
            let _ = writeln!(out, "{}", suite.suite_name);
            for result in &suite.results {
                let mark = match result.status {
                    TestStatus::Passed => "ok",
                    TestStatus::Failed => "FAIL",
                    TestStatus::Skipped => "skip",
                };
                let _ = writeln!(
                    out,
                    "  {mark:<4} {} ({:.0}ms)",
                    result.name,
                    result.duration.as_secs_f64() * 1000.0
                );
                if let (Some(kind), Some(error)) = (&result.error_kind, &result.error) {
                    let _ = writeln!(out, "       {kind}: {error}");
                }
            }
        }
        let _ = writeln!(out, "\n{}", self.summary());
        out
    }

    /// Render the JSON report
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn render_json(&self) -> LanecheckResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        let _ = writeln!(
            xml,
            r#"<testsuites tests="{}" failures="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
            self.total_count(),
            self.failed_count(),
            self.skipped_count(),
            self.total_duration().as_secs_f64(),
            self.started_at.to_rfc3339()
        );

        for suite in &self.suites {
            let _ = writeln!(
                xml,
                r#"  <testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}">"#,
                escape_xml(&suite.suite_name),
                suite.total(),
                suite.failed_count(),
                suite.skipped_count(),
                suite.duration.as_secs_f64()
            );

            for result in &suite.results {
                let _ = write!(
                    xml,
                    r#"    <testcase classname="{}" name="{}" time="{:.3}""#,
                    escape_xml(&suite.suite_name),
                    escape_xml(&result.name),
                    result.duration.as_secs_f64()
                );
                match result.status {
                    TestStatus::Passed => xml.push_str("/>\n"),
                    TestStatus::Skipped => xml.push_str(">\n      <skipped/>\n    </testcase>\n"),
                    TestStatus::Failed => {
                        let error = result.error.as_deref().unwrap_or_default();
                        let _ = writeln!(
                            xml,
                            ">\n      <failure type=\"{}\" message=\"{}\">{}</failure>\n    </testcase>",
                            escape_xml(result.error_kind.as_deref().unwrap_or("Error")),
                            escape_xml(error),
                            escape_xml(error)
                        );
                    }
                }
            }

            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");
        xml
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::harness::TestResult;

    fn report() -> RunReport {
        let mut report = RunReport::new();
        report.add(SuiteResults {
            suite_name: "Position <Details>".to_string(),
            results: vec![
                TestResult::pass("shows title").with_duration(Duration::from_millis(12)),
                TestResult::fail(
                    "moves card",
                    "InterceptTimeout",
                    "no call for @updateCandidate within 5000ms",
                ),
                TestResult::skip("later"),
            ],
            duration: Duration::from_millis(40),
        });
        report
    }

    mod format_tests {
        use super::*;

        #[test]
        fn test_parse() {
            assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
            assert_eq!(ReportFormat::parse("xml"), Some(ReportFormat::Junit));
            assert_eq!(ReportFormat::parse("html"), None);
            assert_eq!(ReportFormat::Junit.extension(), "xml");
        }
    }

    mod report_tests {
        use super::*;

        #[test]
        fn test_counts() {
            let report = report();
            assert_eq!(report.total_count(), 3);
            assert_eq!(report.passed_count(), 1);
            assert_eq!(report.failed_count(), 1);
            assert_eq!(report.skipped_count(), 1);
            assert!(!report.all_passed());
            assert!(RunReport::new().all_passed());
        }

        #[test]
        fn test_summary() {
            let summary = report().summary();
            assert!(summary.starts_with("1/3 passed, 1 failed, 1 skipped in "));
        }

        #[test]
        fn test_render_text() {
            let text = report().render_text();
            assert!(text.contains("  ok   shows title (12ms)"));
            assert!(text.contains("  FAIL moves card"));
            assert!(text.contains("InterceptTimeout: no call for @updateCandidate"));
        }

        #[test]
        fn test_render_json() {
            let json: serde_json::Value =
                serde_json::from_str(&report().render_json().unwrap()).unwrap();
            assert_eq!(json["suites"][0]["results"][1]["status"], "failed");
            assert_eq!(json["suites"][0]["results"][0]["duration"], 12);
            assert!(json["started_at"].is_string());
        }

        #[test]
        fn test_render_junit() {
            let xml = report().render_junit();
            assert!(xml.starts_with(r#"<?xml version="1.0""#));
            assert!(xml.contains(r#"<testsuite name="Position &lt;Details&gt;" tests="3" failures="1" skipped="1""#));
            assert!(xml.contains(r#"<failure type="InterceptTimeout""#));
            assert!(xml.contains("<skipped/>"));
            assert!(xml.trim_end().ends_with("</testsuites>"));
        }

        #[test]
        fn test_write_creates_parent() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("report.xml");
            report().write(&path, ReportFormat::Junit).unwrap();
            assert!(std::fs::read_to_string(&path).unwrap().contains("<testsuites"));
        }
    }

    mod escape_xml_tests {
        use super::*;

        #[test]
        fn test_escape_special_chars() {
            assert_eq!(escape_xml("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
        }

        #[test]
        fn test_no_escape_needed() {
            assert_eq!(escape_xml("plain"), "plain");
        }
    }
}
