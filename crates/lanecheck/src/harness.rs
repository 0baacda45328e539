//! Test harness for running test suites.
//!
//! Each test gets a fresh [`Session`] from a [`SessionFactory`]; errors and
//! panics are caught at the test boundary, recorded, and the run moves on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::result::LanecheckResult;
use crate::session::Session;

/// Body of a test or `before_each` hook
pub type TestBody = Arc<dyn Fn(&mut Session) -> LanecheckResult<()> + Send + Sync>;

/// Builds the fresh session each test runs in
pub trait SessionFactory: Send + Sync {
    /// Create a session
    fn create(&self) -> Session;
}

impl<F> SessionFactory for F
where
    F: Fn() -> Session + Send + Sync,
{
    fn create(&self) -> Session {
        self()
    }
}

/// A single test case
#[derive(Clone)]
pub struct TestCase {
    /// Test name
    pub name: String,
    /// Skip without running
    pub skip: bool,
    body: TestBody,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    /// Create a new test case
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&mut Session) -> LanecheckResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            skip: false,
            body: Arc::new(body),
        }
    }

    /// Mark as skipped
    #[must_use]
    pub const fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// A test suite containing multiple tests
#[derive(Clone)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Tests in this suite
    pub tests: Vec<TestCase>,
    before_each: Vec<TestBody>,
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("tests", &self.tests)
            .field("before_each", &self.before_each.len())
            .finish()
    }
}

impl TestSuite {
    /// Create a new test suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
            before_each: Vec::new(),
        }
    }

    /// Run `hook` in every test's session before the test body
    #[must_use]
    pub fn before_each(
        mut self,
        hook: impl Fn(&mut Session) -> LanecheckResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.before_each.push(Arc::new(hook));
        self
    }

    /// Add a test
    #[must_use]
    pub fn test(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut Session) -> LanecheckResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.tests.push(TestCase::new(name, body));
        self
    }

    /// Add a test case
    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Get the number of tests
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Keep only tests whose name contains `pattern`
    #[must_use]
    pub fn filtered(mut self, pattern: &str) -> Self {
        self.tests.retain(|t| t.name.contains(pattern));
        self
    }
}

/// Outcome of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test was not run
    Skipped,
}

impl TestStatus {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of running a single test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Outcome
    pub status: TestStatus,
    /// Error message if failed
    pub error: Option<String>,
    /// Error kind if failed (`AssertionFailed`, `InterceptTimeout`, ...)
    pub error_kind: Option<String>,
    /// Test duration
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Passed,
            error: None,
            error_kind: None,
            duration: Duration::ZERO,
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Failed,
            error: Some(error.into()),
            error_kind: Some(kind.into()),
            duration: Duration::ZERO,
        }
    }

    /// Create a skipped test result
    #[must_use]
    pub fn skip(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::Skipped,
            error: None,
            error_kind: None,
            duration: Duration::ZERO,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether the test passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Results from running a test suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResults {
    /// Suite name
    pub suite_name: String,
    /// Individual test results, in declaration order
    pub results: Vec<TestResult>,
    /// Total duration
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if no test failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.status != TestStatus::Failed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Count skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .collect()
    }
}

/// Test harness for running suites
#[derive(Debug, Clone, Copy)]
pub struct TestHarness {
    /// Whether to stop on first failure
    pub fail_fast: bool,
    /// Worker threads; tests never share a session
    pub jobs: usize,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self {
            fail_fast: false,
            jobs: 1,
        }
    }
}

impl TestHarness {
    /// Create a new test harness
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable fail-fast mode
    #[must_use]
    pub const fn with_fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    /// Run up to `jobs` tests concurrently
    #[must_use]
    pub const fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = if jobs == 0 { 1 } else { jobs };
        self
    }

    /// Run a test suite
    ///
    /// With fail-fast, tests not yet started when a failure is recorded are
    /// reported as skipped.
    pub fn run(&self, suite: &TestSuite, factory: &dyn SessionFactory) -> SuiteResults {
        let start = Instant::now();
        tracing::info!(suite = %suite.name, tests = suite.tests.len(), jobs = self.jobs, "suite started");

        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let slots: Mutex<Vec<Option<TestResult>>> = Mutex::new(vec![None; suite.tests.len()]);

        let worker = || loop {
            let index = next.fetch_add(1, Ordering::SeqCst);
            let Some(test) = suite.tests.get(index) else {
                break;
            };
            let result = if stop.load(Ordering::SeqCst) {
                TestResult::skip(&test.name)
            } else {
                run_test(test, &suite.before_each, factory)
            };
            if self.fail_fast && result.status == TestStatus::Failed {
                stop.store(true, Ordering::SeqCst);
            }
            if let Ok(mut slots) = slots.lock() {
                slots[index] = Some(result);
            }
        };

        let workers = self.jobs.min(suite.tests.len()).max(1);
        if workers == 1 {
            worker();
        } else {
            std::thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(worker);
                }
            });
        }

        let results: Vec<TestResult> = slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .zip(&suite.tests)
            .map(|(slot, test)| slot.unwrap_or_else(|| TestResult::skip(&test.name)))
            .collect();

        let results = SuiteResults {
            suite_name: suite.name.clone(),
            results,
            duration: start.elapsed(),
        };
        tracing::info!(
            suite = %suite.name,
            passed = results.passed_count(),
            failed = results.failed_count(),
            skipped = results.skipped_count(),
            "suite finished"
        );
        results
    }
}

fn run_test(test: &TestCase, before_each: &[TestBody], factory: &dyn SessionFactory) -> TestResult {
    if test.skip {
        return TestResult::skip(&test.name);
    }
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut session = factory.create();
        let _span = tracing::debug_span!("test", name = %test.name, session = %session.id()).entered();
        for hook in before_each {
            hook(&mut session)?;
        }
        (test.body)(&mut session)
    }));

    let result = match outcome {
        Ok(Ok(())) => TestResult::pass(&test.name),
        Ok(Err(err)) => TestResult::fail(&test.name, err.kind(), err.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "test panicked".to_string());
            TestResult::fail(&test.name, "Panic", message)
        }
    };
    let result = result.with_duration(start.elapsed());
    match &result.error {
        None => tracing::debug!(test = %test.name, "passed"),
        Some(error) => tracing::warn!(test = %test.name, %error, "failed"),
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::interaction::DragProtocol;
    use crate::pipeline::{pipeline_session, BoardFixture};
    use crate::result::LanecheckError;
    use crate::session::SessionConfig;

    fn factory() -> impl SessionFactory {
        || {
            pipeline_session(
                BoardFixture::default(),
                DragProtocol::NativeDrag,
                SessionConfig::new().with_timeout(100).with_poll_interval(1),
            )
        }
    }

    fn mixed_suite() -> TestSuite {
        TestSuite::new("mixed")
            .test("passes", |_| Ok(()))
            .test("fails", |_| Err(LanecheckError::assertion("count", "3", "2")))
            .test("panics", |_| panic!("boom"))
            .test("also passes", |_| Ok(()))
    }

    mod result_tests {
        use super::*;

        #[test]
        fn test_result_constructors() {
            assert!(TestResult::pass("a").passed());
            let failed = TestResult::fail("b", "AssertionFailed", "nope");
            assert_eq!(failed.status, TestStatus::Failed);
            assert_eq!(failed.error_kind.as_deref(), Some("AssertionFailed"));
            assert_eq!(TestResult::skip("c").status.as_str(), "skipped");
        }

        #[test]
        fn test_result_json_duration_in_ms() {
            let result = TestResult::pass("a").with_duration(Duration::from_millis(42));
            let json = serde_json::to_value(&result).unwrap();
            assert_eq!(json["duration"], 42);
            assert_eq!(json["status"], "passed");
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_failures_do_not_stop_run() {
            let results = TestHarness::new().run(&mixed_suite(), &factory());
            assert_eq!(results.total(), 4);
            assert_eq!(results.passed_count(), 2);
            assert_eq!(results.failed_count(), 2);
            assert!(!results.all_passed());
            assert_eq!(results.results[2].error_kind.as_deref(), Some("Panic"));
            assert_eq!(results.results[2].error.as_deref(), Some("boom"));
        }

        #[test]
        fn test_fail_fast_skips_rest() {
            let results = TestHarness::new()
                .with_fail_fast()
                .run(&mixed_suite(), &factory());
            let statuses: Vec<_> = results.results.iter().map(|r| r.status).collect();
            assert_eq!(
                statuses,
                vec![
                    TestStatus::Passed,
                    TestStatus::Failed,
                    TestStatus::Skipped,
                    TestStatus::Skipped
                ]
            );
        }

        #[test]
        fn test_parallel_keeps_declaration_order() {
            let mut suite = TestSuite::new("parallel");
            for i in 0..8 {
                suite.add_test(TestCase::new(format!("t{i}"), |s| s.goto_ready("/positions/1", "h2")));
            }
            let results = TestHarness::new().with_jobs(4).run(&suite, &factory());
            assert!(results.all_passed());
            let names: Vec<_> = results.results.iter().map(|r| r.name.clone()).collect();
            assert_eq!(names, (0..8).map(|i| format!("t{i}")).collect::<Vec<_>>());
        }

        #[test]
        fn test_before_each_runs_in_each_session() {
            let suite = TestSuite::new("hooks")
                .before_each(|s| s.goto_ready("/positions", "[data-cy=position-card]"))
                .test("on positions page", |s| {
                    if s.current_path() == Some("/positions") {
                        Ok(())
                    } else {
                        Err(LanecheckError::assertion("path", "/positions", "other"))
                    }
                })
                .test("second test", |s| s.find("[data-cy=position-card]").first().map(|_| ()));
            let results = TestHarness::new().run(&suite, &factory());
            assert!(results.all_passed());
        }

        #[test]
        fn test_skipped_and_filtered() {
            let mut suite = TestSuite::new("skip").test("keep me", |_| Ok(()));
            suite.add_test(TestCase::new("skip me", |_| Ok(())).skipped());
            let results = TestHarness::new().run(&suite, &factory());
            assert_eq!(results.skipped_count(), 1);
            assert!(results.all_passed());

            let filtered = suite.filtered("keep");
            assert_eq!(filtered.test_count(), 1);
        }
    }
}
