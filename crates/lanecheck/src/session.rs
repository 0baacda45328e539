//! Per-test session: the explicit context every step runs against.
//!
//! A session owns the application under test, the current document, and the
//! network with its intercept registry. Nothing is shared between sessions,
//! so tests can run in parallel, and dropping a session tears its rules down.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::{Application, ConsoleLevel, ConsoleMessage, DomEvent, EventKind};
use crate::assertion::{evaluate, ElementState, Predicate, Subject};
use crate::dom::{Document, El};
use crate::interaction::{DispatchOutcome, DragOptions};
use crate::network::{
    Backend, HttpMethod, InterceptRule, Network, RecordedCall, RuleHandle, RuleState,
    StubResponse, UrlPattern,
};
use crate::query::{ElementHandle, Locator, Query};
use crate::result::{LanecheckError, LanecheckResult};
use crate::selector::Selector;
use crate::wait::{poll, Polled, WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Default readiness selector
pub const DEFAULT_READINESS_SELECTOR: &str = "body";

/// Default timeout for `await_call` (5 seconds)
pub const DEFAULT_AWAIT_TIMEOUT_MS: u64 = 5_000;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for `goto`/`reload` readiness
    pub navigation_timeout_ms: u64,
    /// Timeout for `await_call`
    pub await_timeout_ms: u64,
    /// Timeout for polling assertions
    pub assertion_timeout_ms: u64,
    /// Interval between polls
    pub poll_interval_ms: u64,
    /// Element whose visibility marks a view as ready
    pub readiness_selector: String,
    /// Drag strictness
    pub drag: DragOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            await_timeout_ms: DEFAULT_AWAIT_TIMEOUT_MS,
            assertion_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            readiness_selector: DEFAULT_READINESS_SELECTOR.to_string(),
            drag: DragOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Create config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, ms: u64) -> Self {
        self.navigation_timeout_ms = ms;
        self
    }

    /// Set `await_call` timeout
    #[must_use]
    pub const fn with_await_timeout(mut self, ms: u64) -> Self {
        self.await_timeout_ms = ms;
        self
    }

    /// Set polling assertion timeout
    #[must_use]
    pub const fn with_assertion_timeout(mut self, ms: u64) -> Self {
        self.assertion_timeout_ms = ms;
        self
    }

    /// Apply one timeout to navigation, awaits, and polling assertions
    #[must_use]
    pub const fn with_timeout(self, ms: u64) -> Self {
        self.with_navigation_timeout(ms)
            .with_await_timeout(ms)
            .with_assertion_timeout(ms)
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the default readiness selector
    #[must_use]
    pub fn with_readiness_selector(mut self, selector: impl Into<String>) -> Self {
        self.readiness_selector = selector.into();
        self
    }

    /// Set drag options
    #[must_use]
    pub const fn with_drag_options(mut self, drag: DragOptions) -> Self {
        self.drag = drag;
        self
    }

    fn wait(&self, timeout_ms: u64) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(timeout_ms)
            .with_poll_interval(self.poll_interval_ms)
    }
}

/// A test's private browser-like context
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    app: Box<dyn Application>,
    network: Network,
    document: Document,
    generation: u64,
    current_path: Option<String>,
    console: Vec<ConsoleMessage>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("current_path", &self.current_path)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over an application and the backend it talks to
    #[must_use]
    pub fn new(app: Box<dyn Application>, backend: Box<dyn Backend>, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "session created");
        Self {
            id,
            config,
            app,
            network: Network::new(backend),
            document: Document::new(El::new("body")),
            generation: 0,
            current_path: None,
            console: Vec::new(),
        }
    }

    /// Session id used to correlate log lines
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current document
    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Current document generation; bumped by every navigation
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Path of the loaded view
    #[must_use]
    pub fn current_path(&self) -> Option<&str> {
        self.current_path.as_deref()
    }

    // =========================================================================
    // Navigator
    // =========================================================================

    /// Load `path` and wait for the default readiness selector
    pub fn goto(&mut self, path: &str) -> LanecheckResult<()> {
        let selector = self.config.readiness_selector.clone();
        self.goto_ready(path, selector)
    }

    /// Load `path` and wait until `ready` is visible
    pub fn goto_ready(&mut self, path: &str, ready: impl Into<Selector>) -> LanecheckResult<()> {
        self.load(path)?;
        self.wait_ready(path, &ready.into())
    }

    /// Re-fetch the current view with the default readiness selector
    pub fn reload(&mut self) -> LanecheckResult<()> {
        let selector = self.config.readiness_selector.clone();
        self.reload_ready(selector)
    }

    /// Re-fetch the current view and wait until `ready` is visible
    ///
    /// Every handle resolved before the reload becomes stale.
    pub fn reload_ready(&mut self, ready: impl Into<Selector>) -> LanecheckResult<()> {
        let path = self
            .current_path
            .clone()
            .ok_or_else(|| LanecheckError::application("reload before any navigation"))?;
        self.goto_ready(&path, ready)
    }

    fn load(&mut self, path: &str) -> LanecheckResult<()> {
        let mut document = self.app.render(path, &mut self.network)?;
        self.generation += 1;
        document.set_generation(self.generation);
        self.document = document;
        self.current_path = Some(path.to_string());
        // Whatever the previous page logged while unloading stays with it.
        let unloaded = self.app.take_console();
        self.console.clear();
        tracing::debug!(
            session = %self.id,
            path,
            generation = self.generation,
            discarded = unloaded.len(),
            "navigate"
        );
        Ok(())
    }

    fn wait_ready(&mut self, path: &str, ready: &Selector) -> LanecheckResult<()> {
        let options = self.config.wait(self.config.navigation_timeout_ms);
        let locator = Locator::new(ready.clone());
        let polled = poll(&options, || {
            self.pump()?;
            let handles = locator.resolve(&self.document)?;
            Ok(handles
                .iter()
                .any(|h| self.document.is_visible(h.node()))
                .then_some(()))
        })?;
        match polled {
            Polled::Ready { .. } => Ok(()),
            Polled::TimedOut { .. } => Err(LanecheckError::NavigationTimeout {
                path: path.to_string(),
                selector: ready.to_string(),
                timeout_ms: options.timeout_ms,
            }),
        }
    }

    /// Let the application run its queued work once
    pub fn pump(&mut self) -> LanecheckResult<()> {
        self.app.tick(&mut self.document, &mut self.network)?;
        self.collect_console();
        Ok(())
    }

    fn collect_console(&mut self) {
        self.console.extend(self.app.take_console());
    }

    /// Console messages logged since the last navigation
    #[must_use]
    pub fn console(&self) -> &[ConsoleMessage] {
        &self.console
    }

    /// Console errors logged since the last navigation
    #[must_use]
    pub fn console_errors(&self) -> Vec<&ConsoleMessage> {
        self.console
            .iter()
            .filter(|m| m.level == ConsoleLevel::Error)
            .collect()
    }

    // =========================================================================
    // Query engine
    // =========================================================================

    /// Lazy query over the whole document
    pub fn find(&self, selector: impl Into<Selector>) -> Query<'_> {
        Query::new(&self.document, Locator::new(selector))
    }

    /// Lazy query scoped to the descendants of `scope`
    pub fn within(&self, scope: ElementHandle, selector: impl Into<Selector>) -> Query<'_> {
        Query::new(&self.document, Locator::within(scope, selector))
    }

    /// Bind an existing locator to the current document
    pub fn locate(&self, locator: Locator) -> Query<'_> {
        Query::new(&self.document, locator)
    }

    /// Deepest elements whose text contains `text`
    pub fn contains(&self, text: impl Into<String>) -> Query<'_> {
        self.find(Selector::text(text))
    }

    pub(crate) fn check_handle(&self, handle: ElementHandle) -> LanecheckResult<()> {
        handle.check(&self.document)
    }

    /// Text content of an element
    pub fn text(&self, handle: ElementHandle) -> LanecheckResult<String> {
        self.check_handle(handle)?;
        Ok(self.document.text_content(handle.node()))
    }

    /// Attribute of an element
    pub fn attribute(&self, handle: ElementHandle, name: &str) -> LanecheckResult<Option<String>> {
        self.check_handle(handle)?;
        Ok(self
            .document
            .get(handle.node())
            .and_then(|el| el.attribute(name))
            .map(ToString::to_string))
    }

    /// Whether an element is visible
    pub fn is_visible(&self, handle: ElementHandle) -> LanecheckResult<bool> {
        self.check_handle(handle)?;
        Ok(self.document.is_visible(handle.node()))
    }

    /// Snapshot of an element for assertions
    pub fn inspect(&self, handle: ElementHandle) -> LanecheckResult<ElementState> {
        self.check_handle(handle)?;
        let el = self
            .document
            .get(handle.node())
            .ok_or_else(|| LanecheckError::application("handle points outside the document"))?;
        Ok(ElementState {
            tag: el.tag().to_string(),
            text: self.document.text_content(handle.node()),
            visible: self.document.is_visible(handle.node()),
            attributes: el.attributes().clone(),
        })
    }

    // =========================================================================
    // Event dispatch
    // =========================================================================

    pub(crate) fn dispatch(
        &mut self,
        kind: EventKind,
        target: ElementHandle,
    ) -> LanecheckResult<DispatchOutcome> {
        self.check_handle(target)?;
        let event = DomEvent::new(kind, target.node());
        let effect = self
            .app
            .dispatch(&mut self.document, &event, &mut self.network)?;
        self.collect_console();
        tracing::trace!(
            session = %self.id,
            event = %kind,
            target = target.node().index(),
            handled = effect.handled,
            "dispatch"
        );
        if let Some(path) = effect.navigate {
            self.load(&path)?;
        }
        Ok(DispatchOutcome {
            event: kind,
            handled: effect.handled,
        })
    }

    // =========================================================================
    // Network interceptor
    // =========================================================================

    /// Record (and optionally stub) requests matching `method` and `pattern`
    ///
    /// Fails with `InvalidUrlPattern` when a regex pattern does not compile.
    pub fn intercept(
        &mut self,
        method: HttpMethod,
        pattern: impl Into<UrlPattern>,
        stub: Option<StubResponse>,
    ) -> LanecheckResult<RuleHandle> {
        let mut rule = InterceptRule::new(method, pattern);
        if let Some(stub) = stub {
            rule = rule.with_stub(stub);
        }
        self.intercept_rule(rule)
    }

    /// Register a fully built rule
    pub fn intercept_rule(&mut self, rule: InterceptRule) -> LanecheckResult<RuleHandle> {
        self.network.interceptor_mut().register(rule)
    }

    /// Rule registered under `alias`
    pub fn rule(&self, alias: &str) -> LanecheckResult<RuleHandle> {
        self.network.interceptor().resolve_alias(alias)
    }

    /// Current state of a rule
    pub fn rule_state(&self, rule: RuleHandle) -> LanecheckResult<RuleState> {
        self.network.interceptor().state(rule)
    }

    /// Wait for and consume the oldest unread call, using the configured timeout
    pub fn await_call(&mut self, rule: RuleHandle) -> LanecheckResult<RecordedCall> {
        let timeout = self.config.await_timeout_ms;
        self.await_call_within(rule, timeout)
    }

    /// Wait up to `timeout_ms` for an unread call and consume it
    pub fn await_call_within(
        &mut self,
        rule: RuleHandle,
        timeout_ms: u64,
    ) -> LanecheckResult<RecordedCall> {
        let label = self.network.interceptor().rule(rule)?.label();
        let options = self.config.wait(timeout_ms);
        let polled = poll(&options, || {
            if let Some(call) = self.network.interceptor_mut().take_unread(rule)? {
                return Ok(Some(call));
            }
            self.pump()?;
            self.network.interceptor_mut().take_unread(rule)
        })?;
        match polled {
            Polled::Ready { value, elapsed } => {
                tracing::debug!(session = %self.id, rule = %label, ?elapsed, "call observed");
                Ok(value)
            }
            Polled::TimedOut { .. } => Err(LanecheckError::InterceptTimeout {
                rule: label,
                timeout_ms,
            }),
        }
    }

    /// Snapshot of every call recorded for the rule
    pub fn all_calls(&mut self, rule: RuleHandle) -> LanecheckResult<Vec<RecordedCall>> {
        self.network.interceptor_mut().all_calls(rule)
    }

    /// Poll until the rule has recorded exactly `expected` calls
    pub fn expect_call_count(
        &mut self,
        rule: RuleHandle,
        expected: usize,
        timeout_ms: u64,
    ) -> LanecheckResult<()> {
        let options = self.config.wait(timeout_ms);
        let mut actual = 0;
        let polled = poll(&options, || {
            self.pump()?;
            actual = self.network.interceptor().rule(rule)?.call_count();
            Ok((actual == expected).then_some(()))
        })?;
        match polled {
            Polled::Ready { .. } => Ok(()),
            Polled::TimedOut { .. } => Err(LanecheckError::assertion(
                Predicate::CountEquals(expected).to_string(),
                expected.to_string(),
                actual.to_string(),
            )),
        }
    }

    /// Every request issued in this session
    #[must_use]
    pub fn calls_observed(&self) -> &[RecordedCall] {
        self.network.log()
    }

    // =========================================================================
    // Polling assertions
    // =========================================================================

    /// Re-resolve `locator` until `predicate` holds or the timeout elapses
    ///
    /// Count predicates see the number of matches; all others see the first
    /// match. Assertion and out-of-range failures are retried; the last one is
    /// returned on timeout. Any other error ends the wait immediately.
    pub fn expect_eventually(
        &mut self,
        locator: &Locator,
        predicate: &Predicate,
        timeout_ms: u64,
    ) -> LanecheckResult<()> {
        let options = self.config.wait(timeout_ms);
        let mut last: Option<LanecheckError> = None;
        let polled = poll(&options, || {
            self.pump()?;
            let attempt = self.subject_for(locator, predicate).and_then(|subject| {
                evaluate(&subject, predicate)
            });
            match attempt {
                Ok(()) => Ok(Some(())),
                Err(err @ (LanecheckError::AssertionFailed { .. } | LanecheckError::OutOfRange { .. })) => {
                    last = Some(err);
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        })?;
        match polled {
            Polled::Ready { .. } => Ok(()),
            Polled::TimedOut { .. } => Err(last.unwrap_or_else(|| {
                LanecheckError::assertion(predicate.to_string(), "to hold", "timed out")
            })),
        }
    }

    /// Evaluate `predicate` once against the current document
    pub fn expect_now(&self, locator: &Locator, predicate: &Predicate) -> LanecheckResult<()> {
        let subject = self.subject_for(locator, predicate)?;
        evaluate(&subject, predicate)
    }

    fn subject_for(&self, locator: &Locator, predicate: &Predicate) -> LanecheckResult<Subject> {
        if predicate.is_count() {
            Ok(Subject::Count(locator.count(&self.document)?))
        } else {
            let handle = locator.one(&self.document)?;
            Ok(Subject::Element(self.inspect(handle)?))
        }
    }
}
