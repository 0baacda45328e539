//! Declarative YAML suites.
//!
//! A suite file lists tests as sequences of steps. Steps that read the page
//! retry until their timeout, so a file reads like the interactive suite it
//! replaces:
//!
//! ```yaml
//! name: Position Details
//! groups:
//!   - name: Candidate Stage Change
//!     before_each:
//!       - action: intercept
//!         method: PUT
//!         url: "**/candidates/*"
//!         alias: updateCandidate
//!       - action: goto
//!         path: /positions/1
//!         ready: '[data-testid="stage-column"]'
//!     tests:
//!       - name: sends the update
//!         steps:
//!           - action: drag
//!             from: '[data-testid="candidate-card"]'
//!             to: { selector: '[data-testid="stage-column"]', nth: 1 }
//!           - action: wait
//!             alias: updateCandidate
//!             method: PUT
//!             body_has: [applicationId, currentInterviewStep]
//! ```
//!
//! `capture` stores a count or text in a per-test variable; `${name}` in text
//! fields and `count.var` read it back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::assertion::{expect, Predicate};
use crate::harness::{TestCase, TestSuite};
use crate::interaction::{DragOptions, DragProtocol};
use crate::network::{HttpMethod, InterceptRule, StubResponse, UrlPattern};
use crate::query::{ElementHandle, Locator};
use crate::result::{LanecheckError, LanecheckResult};
use crate::selector::Selector;
use crate::session::Session;
use crate::wait::{poll, WaitOptions};

// =============================================================================
// Schema
// =============================================================================

/// Root of a suite file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteFile {
    /// Suite name
    pub name: String,
    /// Steps run before every test in the file
    #[serde(default)]
    pub before_each: Vec<Step>,
    /// Top-level tests
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    /// Nested groups with their own `before_each`
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

/// Group of tests sharing setup steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group name, prefixed to test names
    pub name: String,
    /// Steps run after the suite's `before_each`
    #[serde(default)]
    pub before_each: Vec<Step>,
    /// Tests
    pub tests: Vec<TestSpec>,
}

/// One test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    /// Test name
    pub name: String,
    /// Skip without running
    #[serde(default)]
    pub skip: bool,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// A single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate and wait for readiness
    Goto {
        /// Path to load
        path: String,
        /// Readiness selector (session default when absent)
        #[serde(default)]
        ready: Option<String>,
    },
    /// Re-fetch the current view
    Reload {
        /// Readiness selector (session default when absent)
        #[serde(default)]
        ready: Option<String>,
    },
    /// Register an intercept rule
    Intercept(InterceptSpec),
    /// Simulate a drag
    Drag(DragSpec),
    /// Click an element
    Click {
        /// Element to click
        target: Target,
    },
    /// Let the application run for a while
    Pause {
        /// Duration in milliseconds
        ms: u64,
    },
    /// Await the next unread call of a rule and check it
    Wait(WaitSpec),
    /// Check the total number of calls a rule has recorded
    CallCount {
        /// Rule alias
        alias: String,
        /// Expected count
        equals: usize,
        /// Override the assertion timeout
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// Store a value in a test variable
    Capture(CaptureSpec),
    /// Check elements
    Expect(ExpectSpec),
    /// Check the current path
    Url {
        /// Substring the path must contain
        contains: String,
    },
    /// Fail if the page logged console errors since the last navigation
    NoConsoleErrors,
}

impl Step {
    /// Action name as written in YAML
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Goto { .. } => "goto",
            Self::Reload { .. } => "reload",
            Self::Intercept(_) => "intercept",
            Self::Drag(_) => "drag",
            Self::Click { .. } => "click",
            Self::Pause { .. } => "pause",
            Self::Wait(_) => "wait",
            Self::CallCount { .. } => "call_count",
            Self::Capture(_) => "capture",
            Self::Expect(_) => "expect",
            Self::Url { .. } => "url",
            Self::NoConsoleErrors => "no_console_errors",
        }
    }
}

/// `intercept` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptSpec {
    /// Method to match
    #[serde(default = "any_method")]
    pub method: HttpMethod,
    /// URL pattern (`**` and `*` wildcards, otherwise substring)
    pub url: String,
    /// Alias for `wait` and `call_count`
    #[serde(default)]
    pub alias: Option<String>,
    /// Canned response
    #[serde(default)]
    pub stub: Option<StubSpec>,
}

const fn any_method() -> HttpMethod {
    HttpMethod::Any
}

/// Canned response of an `intercept` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubSpec {
    /// Status code
    #[serde(default = "ok_status")]
    pub status: u16,
    /// JSON body
    #[serde(default)]
    pub body: Value,
}

const fn ok_status() -> u16 {
    200
}

/// `drag` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragSpec {
    /// Element to drag
    pub from: Target,
    /// Element to drop onto
    pub to: Target,
    /// Event protocol
    #[serde(default)]
    pub protocol: DragProtocol,
    /// Fail when the page ignores the sequence (session default when absent)
    #[serde(default)]
    pub require_handled: Option<bool>,
}

/// `wait` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitSpec {
    /// Rule alias, with or without a leading `@`
    pub alias: String,
    /// Override the await timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Expected method
    #[serde(default)]
    pub method: Option<HttpMethod>,
    /// Substring of the URL
    #[serde(default)]
    pub url_contains: Option<String>,
    /// Keys the body must have
    #[serde(default)]
    pub body_has: Vec<String>,
    /// Exact key set of the body
    #[serde(default)]
    pub body_keys: Option<Vec<String>>,
    /// Expected body field values
    #[serde(default)]
    pub body_fields: BTreeMap<String, Value>,
    /// Expected response status
    #[serde(default)]
    pub status: Option<u16>,
}

/// `capture` step; exactly one of `count` or `text`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSpec {
    /// Variable name
    pub into: String,
    /// Capture the number of matches
    #[serde(default)]
    pub count: Option<Target>,
    /// Capture the trimmed text of the first match
    #[serde(default)]
    pub text: Option<Target>,
}

/// `expect` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectSpec {
    /// Elements to check
    pub target: Target,
    /// `true` for visible, `false` for hidden
    #[serde(default)]
    pub visible: Option<bool>,
    /// Text must be non-empty
    #[serde(default)]
    pub not_empty: bool,
    /// Text must contain
    #[serde(default)]
    pub text_contains: Option<String>,
    /// Trimmed text must equal
    #[serde(default)]
    pub text: Option<String>,
    /// Attribute check
    #[serde(default)]
    pub attribute: Option<AttributeSpec>,
    /// Match count check
    #[serde(default)]
    pub count: Option<CountSpec>,
    /// Apply element checks to every match instead of the first
    #[serde(default)]
    pub each: bool,
    /// Override the assertion timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Attribute check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name
    pub name: String,
    /// Expected value; presence only when absent
    #[serde(default)]
    pub value: Option<String>,
}

/// Count check; exactly one of `equals`, `greater_than`, `at_least`, `var`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSpec {
    /// Exact count
    #[serde(default)]
    pub equals: Option<usize>,
    /// Strict lower bound
    #[serde(default)]
    pub greater_than: Option<usize>,
    /// Inclusive lower bound
    #[serde(default)]
    pub at_least: Option<usize>,
    /// Exact count taken from a captured variable
    #[serde(default)]
    pub var: Option<String>,
    /// Added to `var`
    #[serde(default)]
    pub delta: i64,
}

/// Element reference: a bare selector string or a structured target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TargetRepr")]
pub struct Target {
    /// CSS selector
    pub selector: Option<String>,
    /// Text filter (or a text selector when `selector` is absent)
    pub text: Option<String>,
    /// Index into the matches
    pub nth: Option<usize>,
    /// Search among the descendants of another target
    pub within: Option<Box<Target>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetRepr {
    Selector(String),
    Full(TargetFields),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetFields {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    nth: Option<usize>,
    #[serde(default)]
    within: Option<Box<Target>>,
}

impl From<TargetRepr> for Target {
    fn from(repr: TargetRepr) -> Self {
        match repr {
            TargetRepr::Selector(selector) => Self::selector(selector),
            TargetRepr::Full(TargetFields {
                selector,
                text,
                nth,
                within,
            }) => Self {
                selector,
                text,
                nth,
                within,
            },
        }
    }
}

impl Target {
    /// Target every match of a CSS selector
    #[must_use]
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            text: None,
            nth: None,
            within: None,
        }
    }

    /// Narrow to the `index`-th match
    #[must_use]
    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    /// Search within `parent`
    #[must_use]
    pub fn within(mut self, parent: Self) -> Self {
        self.within = Some(Box::new(parent));
        self
    }

    /// Build the locator, substituting variables in the text filter
    pub fn locator(&self, vars: &Vars) -> LanecheckResult<Locator> {
        let selector = match (&self.selector, &self.text) {
            (Some(css), Some(text)) => Selector::css(css).with_text(interpolate(text, vars)?),
            (Some(css), None) => Selector::css(css),
            (None, Some(text)) => Selector::text(interpolate(text, vars)?),
            (None, None) => return Err(LanecheckError::suite("target needs a selector or text")),
        };
        let locator = match &self.within {
            Some(parent) => parent.locator(vars)?.find(selector),
            None => Locator::new(selector),
        };
        Ok(match self.nth {
            Some(index) => locator.nth(index),
            None => locator,
        })
    }

    fn variables(&self) -> Vec<&str> {
        let mut names = self.text.as_deref().map(variables_in).unwrap_or_default();
        if let Some(parent) = &self.within {
            names.extend(parent.variables());
        }
        names
    }
}

// =============================================================================
// Variables
// =============================================================================

/// A captured value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Match count
    Count(usize),
    /// Element text
    Text(String),
}

impl fmt::Display for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Variables of one test run
pub type Vars = BTreeMap<String, Captured>;

/// Replace `${name}` with captured values
pub fn interpolate(template: &str, vars: &Vars) -> LanecheckResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| LanecheckError::suite(format!("unterminated variable in {template:?}")))?;
        let name = &after[..end];
        let value = vars
            .get(name)
            .ok_or_else(|| LanecheckError::suite(format!("unknown variable `{name}`")))?;
        out.push_str(&value.to_string());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn variables_in(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

// =============================================================================
// Loading and validation
// =============================================================================

impl SuiteFile {
    /// Parse and validate a suite from YAML
    pub fn from_yaml(yaml: &str) -> LanecheckResult<Self> {
        let file: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LanecheckError::suite(format!("invalid suite YAML: {e}")))?;
        file.validate()?;
        Ok(file)
    }

    /// Read, parse, and validate a suite file
    pub fn load(path: &Path) -> LanecheckResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml).map_err(|err| match err {
            LanecheckError::Suite { message } => {
                LanecheckError::suite(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Number of tests across top level and groups
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.groups.iter().map(|g| g.tests.len()).sum::<usize>()
    }

    /// Check step shapes and variable use
    pub fn validate(&self) -> LanecheckResult<()> {
        if self.test_count() == 0 {
            return Err(LanecheckError::suite(format!("suite `{}` has no tests", self.name)));
        }
        for step in &self.before_each {
            if matches!(step, Step::Capture(_)) {
                return Err(LanecheckError::suite(
                    "capture is not allowed in before_each; variables belong to one test",
                ));
            }
        }
        for (name, body) in self.flattened() {
            let mut steps = self.before_each.clone();
            steps.extend(body);
            validate_steps(&steps).map_err(|err| match err {
                LanecheckError::Suite { message } => {
                    LanecheckError::suite(format!("test `{name}`: {message}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Test names with their steps, group setup included
    fn flattened(&self) -> Vec<(String, Vec<Step>)> {
        let top = self.tests.iter().map(|t| (t.name.clone(), t.steps.clone()));
        let grouped = self.groups.iter().flat_map(|group| {
            group.tests.iter().map(move |t| {
                let mut steps = group.before_each.clone();
                steps.extend(t.steps.iter().cloned());
                (format!("{} > {}", group.name, t.name), steps)
            })
        });
        top.chain(grouped).collect()
    }

    /// Build a runnable suite
    #[must_use]
    pub fn to_suite(&self) -> TestSuite {
        let mut suite = TestSuite::new(&self.name);
        if !self.before_each.is_empty() {
            let steps = Arc::new(self.before_each.clone());
            suite = suite.before_each(move |session| run_steps(session, &steps, &mut Vars::new()));
        }

        let skipped: BTreeSet<String> = self
            .tests
            .iter()
            .filter(|t| t.skip)
            .map(|t| t.name.clone())
            .chain(self.groups.iter().flat_map(|g| {
                g.tests
                    .iter()
                    .filter(|t| t.skip)
                    .map(move |t| format!("{} > {}", g.name, t.name))
            }))
            .collect();

        for (name, steps) in self.flattened() {
            let skip = skipped.contains(&name);
            let case = TestCase::new(name, move |session| {
                run_steps(session, &steps, &mut Vars::new())
            });
            suite.add_test(if skip { case.skipped() } else { case });
        }
        suite
    }
}

fn validate_steps(steps: &[Step]) -> LanecheckResult<()> {
    let mut known: BTreeSet<&str> = BTreeSet::new();
    let mut aliases: BTreeSet<&str> = BTreeSet::new();
    for (index, step) in steps.iter().enumerate() {
        let at = |message: String| LanecheckError::suite(format!("step {} ({}): {message}", index + 1, step.action()));
        match step {
            Step::Intercept(spec) => {
                if let Some(alias) = &spec.alias {
                    aliases.insert(alias.trim_start_matches('@'));
                }
            }
            Step::Wait(WaitSpec { alias, .. }) | Step::CallCount { alias, .. } => {
                if !aliases.contains(alias.trim_start_matches('@')) {
                    return Err(at(format!("alias `{alias}` is not registered by an earlier intercept")));
                }
            }
            Step::Drag(spec) => {
                check_target(&spec.from, &known)?;
                check_target(&spec.to, &known)?;
            }
            Step::Click { target } => check_target(target, &known)?,
            Step::Capture(spec) => {
                let target = match (&spec.count, &spec.text) {
                    (Some(t), None) | (None, Some(t)) => t,
                    _ => return Err(at("exactly one of `count` or `text` is required".into())),
                };
                check_target(target, &known)?;
                known.insert(spec.into.as_str());
            }
            Step::Expect(spec) => {
                check_target(&spec.target, &known)?;
                if let Some(text) = spec.text_contains.as_deref().or(spec.text.as_deref()) {
                    check_vars(variables_in(text), &known)?;
                }
                if let Some(count) = &spec.count {
                    let set = [
                        count.equals.is_some(),
                        count.greater_than.is_some(),
                        count.at_least.is_some(),
                        count.var.is_some(),
                    ];
                    if set.iter().filter(|s| **s).count() != 1 {
                        return Err(at(
                            "count needs exactly one of `equals`, `greater_than`, `at_least`, `var`".into(),
                        ));
                    }
                    if let Some(var) = &count.var {
                        check_vars(vec![var.as_str()], &known)?;
                    }
                }
                if spec.checks_len() == 0 {
                    return Err(at("no checks given".into()));
                }
            }
            Step::Goto { .. }
            | Step::Reload { .. }
            | Step::Pause { .. }
            | Step::Url { .. }
            | Step::NoConsoleErrors => {}
        }
    }
    Ok(())
}

fn check_target<'a>(target: &'a Target, known: &BTreeSet<&'a str>) -> LanecheckResult<()> {
    let mut scope = Some(target);
    while let Some(t) = scope {
        if t.selector.is_none() && t.text.is_none() {
            return Err(LanecheckError::suite("target needs a selector or text"));
        }
        scope = t.within.as_deref();
    }
    check_vars(target.variables(), known)
}

fn check_vars<'a>(names: Vec<&'a str>, known: &BTreeSet<&'a str>) -> LanecheckResult<()> {
    match names.into_iter().find(|n| !known.contains(n)) {
        Some(name) => Err(LanecheckError::suite(format!(
            "variable `{name}` is used before it is captured"
        ))),
        None => Ok(()),
    }
}

impl ExpectSpec {
    fn checks_len(&self) -> usize {
        usize::from(self.visible.is_some())
            + usize::from(self.not_empty)
            + usize::from(self.text_contains.is_some())
            + usize::from(self.text.is_some())
            + usize::from(self.attribute.is_some())
            + usize::from(self.count.is_some())
    }

    fn predicates(&self, vars: &Vars) -> LanecheckResult<Vec<Predicate>> {
        let mut predicates = Vec::new();
        if let Some(count) = &self.count {
            predicates.push(count.predicate(vars)?);
        }
        match self.visible {
            Some(true) => predicates.push(Predicate::Visible),
            Some(false) => predicates.push(Predicate::Hidden),
            None => {}
        }
        if self.not_empty {
            predicates.push(Predicate::NotEmpty);
        }
        if let Some(text) = &self.text_contains {
            predicates.push(Predicate::TextContains(interpolate(text, vars)?));
        }
        if let Some(text) = &self.text {
            predicates.push(Predicate::TextEquals(interpolate(text, vars)?));
        }
        if let Some(attr) = &self.attribute {
            predicates.push(match &attr.value {
                Some(value) => Predicate::AttributeEquals {
                    name: attr.name.clone(),
                    value: value.clone(),
                },
                None => Predicate::HasAttribute(attr.name.clone()),
            });
        }
        Ok(predicates)
    }
}

impl CountSpec {
    fn predicate(&self, vars: &Vars) -> LanecheckResult<Predicate> {
        if let Some(n) = self.equals {
            return Ok(Predicate::CountEquals(n));
        }
        if let Some(n) = self.greater_than {
            return Ok(Predicate::CountGreaterThan(n));
        }
        if let Some(n) = self.at_least {
            return Ok(Predicate::CountAtLeast(n));
        }
        let name = self
            .var
            .as_deref()
            .ok_or_else(|| LanecheckError::suite("count has no check"))?;
        let base = match vars.get(name) {
            Some(Captured::Count(n)) => *n,
            Some(Captured::Text(_)) => {
                return Err(LanecheckError::suite(format!("variable `{name}` is not a count")))
            }
            None => return Err(LanecheckError::suite(format!("unknown variable `{name}`"))),
        };
        let expected = i64::try_from(base)
            .ok()
            .and_then(|b| b.checked_add(self.delta))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                LanecheckError::suite(format!("`{name}` {:+} is not a valid count", self.delta))
            })?;
        Ok(Predicate::CountEquals(expected))
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Run steps in order against a session
pub fn run_steps(session: &mut Session, steps: &[Step], vars: &mut Vars) -> LanecheckResult<()> {
    for (index, step) in steps.iter().enumerate() {
        tracing::debug!(session = %session.id(), step = index + 1, action = step.action(), "step");
        run_step(session, step, vars)?;
    }
    Ok(())
}

fn run_step(session: &mut Session, step: &Step, vars: &mut Vars) -> LanecheckResult<()> {
    match step {
        Step::Goto { path, ready } => match ready {
            Some(ready) => session.goto_ready(path, ready.as_str()),
            None => session.goto(path),
        },
        Step::Reload { ready } => match ready {
            Some(ready) => session.reload_ready(ready.as_str()),
            None => session.reload(),
        },
        Step::Intercept(spec) => {
            let stub = spec
                .stub
                .as_ref()
                .map(|s| StubResponse::json(s.body.clone()).with_status(s.status));
            let mut rule = InterceptRule::new(spec.method, UrlPattern::from(spec.url.as_str()));
            if let Some(stub) = stub {
                rule = rule.with_stub(stub);
            }
            if let Some(alias) = &spec.alias {
                rule = rule.with_alias(alias.trim_start_matches('@'));
            }
            session.intercept_rule(rule).map(|_| ())
        }
        Step::Drag(spec) => {
            let source = actionable(session, &spec.from.locator(vars)?)?;
            let target = actionable(session, &spec.to.locator(vars)?)?;
            let report = match spec.require_handled {
                Some(require_handled) => session.simulate_drag_with(
                    source,
                    target,
                    spec.protocol,
                    DragOptions { require_handled },
                ),
                None => session.simulate_drag(source, target, spec.protocol),
            }?;
            tracing::debug!(handled = report.handled(), protocol = %report.protocol, "drag");
            Ok(())
        }
        Step::Click { target } => {
            let handle = actionable(session, &target.locator(vars)?)?;
            session.click(handle).map(|_| ())
        }
        Step::Pause { ms } => {
            let options = WaitOptions::new()
                .with_timeout(*ms)
                .with_poll_interval(session.config().poll_interval_ms);
            poll(&options, || session.pump().map(|()| None::<()>)).map(|_| ())
        }
        Step::Wait(spec) => {
            let rule = session.rule(&spec.alias)?;
            let timeout = spec.timeout_ms.unwrap_or(session.config().await_timeout_ms);
            let call = session.await_call_within(rule, timeout)?;
            let check = expect(call);
            if let Some(method) = spec.method {
                check.to_have_method(method)?;
            }
            if let Some(part) = &spec.url_contains {
                check.to_have_url_containing(part.as_str())?;
            }
            for key in &spec.body_has {
                check.to_have_body_key(key.as_str())?;
            }
            if let Some(keys) = &spec.body_keys {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                check.to_have_body_keys(&keys)?;
            }
            for (key, value) in &spec.body_fields {
                check.to_have_body_field(key.as_str(), value.clone())?;
            }
            if let Some(status) = spec.status {
                check.to_have_status(status)?;
            }
            Ok(())
        }
        Step::CallCount {
            alias,
            equals,
            timeout_ms,
        } => {
            let rule = session.rule(alias)?;
            let timeout = timeout_ms.unwrap_or(session.config().assertion_timeout_ms);
            session.expect_call_count(rule, *equals, timeout)
        }
        Step::Capture(spec) => {
            let value = match (&spec.count, &spec.text) {
                (Some(target), _) => {
                    session.pump()?;
                    Captured::Count(target.locator(vars)?.count(session.document())?)
                }
                (None, Some(target)) => {
                    let handle = actionable(session, &target.locator(vars)?)?;
                    Captured::Text(session.text(handle)?.trim().to_string())
                }
                (None, None) => return Err(LanecheckError::suite("capture needs `count` or `text`")),
            };
            tracing::debug!(var = %spec.into, %value, "captured");
            vars.insert(spec.into.clone(), value);
            Ok(())
        }
        Step::Expect(spec) => run_expect(session, spec, vars),
        Step::Url { contains } => {
            let path = session.current_path().unwrap_or_default();
            if path.contains(contains.as_str()) {
                Ok(())
            } else {
                Err(LanecheckError::assertion(
                    "url.include",
                    contains.clone(),
                    path.to_string(),
                ))
            }
        }
        Step::NoConsoleErrors => {
            session.pump()?;
            let errors = session.console_errors();
            match errors.first() {
                None => Ok(()),
                Some(first) => Err(LanecheckError::assertion(
                    "console.error.not.called",
                    "no console errors",
                    format!("{} error(s), first: {}", errors.len(), first.text),
                )),
            }
        }
    }
}

fn run_expect(session: &mut Session, spec: &ExpectSpec, vars: &Vars) -> LanecheckResult<()> {
    let locator = spec.target.locator(vars)?;
    let timeout = spec.timeout_ms.unwrap_or(session.config().assertion_timeout_ms);
    let predicates = spec.predicates(vars)?;

    if !spec.each {
        for predicate in &predicates {
            session.expect_eventually(&locator, predicate, timeout)?;
        }
        return Ok(());
    }

    let (counts, per_element): (Vec<_>, Vec<_>) = predicates.into_iter().partition(Predicate::is_count);
    for predicate in &counts {
        session.expect_eventually(&locator, predicate, timeout)?;
    }
    session.expect_eventually(&locator, &Predicate::CountAtLeast(1), timeout)?;
    let len = locator.count(session.document())?;
    for index in 0..len {
        let nth = locator.clone().nth(index);
        for predicate in &per_element {
            session.expect_eventually(&nth, predicate, timeout)?;
        }
    }
    Ok(())
}

/// Wait until the locator's element is visible, then resolve it
fn actionable(session: &mut Session, locator: &Locator) -> LanecheckResult<ElementHandle> {
    let timeout = session.config().assertion_timeout_ms;
    session.expect_eventually(locator, &Predicate::Visible, timeout)?;
    locator.one(session.document())
}
