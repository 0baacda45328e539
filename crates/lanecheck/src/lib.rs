//! Lanecheck: declarative UI-interaction and assertion test runner.
//!
//! A test drives an application through a [`Session`]: it navigates, queries
//! elements, simulates clicks and drags, intercepts the network calls those
//! interactions cause, and asserts on elements and calls with polling
//! predicates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      LANECHECK Architecture                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌─────────────────────┐    │
//! │   │ Suite      │    │ Harness    │    │ Session             │    │
//! │   │ (YAML or   │───►│ (fresh     │───►│  Navigator          │    │
//! │   │  Rust)     │    │  session)  │    │  Query engine       │    │
//! │   └────────────┘    └────────────┘    │  Interaction sim    │    │
//! │                                       │  Interceptor ◄─► App│    │
//! │                                       │  Assertions         │    │
//! │                                       └─────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use lanecheck::prelude::*;
//!
//! let mut session = pipeline_session(
//!     BoardFixture::default(),
//!     DragProtocol::NativeDrag,
//!     SessionConfig::default(),
//! );
//! let update = session.intercept(HttpMethod::Put, "**/candidates/*", None)?;
//! session.goto_ready("/positions/1", Selector::test_id("stage-column"))?;
//!
//! let card = session.find(Selector::test_id("candidate-card")).first()?;
//! let column = session.find(Selector::test_id("stage-column")).nth(1)?;
//! session.simulate_drag(card, column, DragProtocol::NativeDrag)?;
//!
//! let call = session.await_call(update)?;
//! expect(call)
//!     .to_have_method(HttpMethod::Put)?
//!     .to_have_body_keys(&["applicationId", "currentInterviewStep"])?;
//! # Ok::<(), lanecheck::LanecheckError>(())
//! ```

#![warn(missing_docs)]

mod app;
mod assertion;
mod dom;
mod harness;
mod interaction;
mod network;
mod query;
mod result;
mod selector;
mod session;
mod wait;

/// Reference hiring-pipeline board and its in-memory backend
pub mod pipeline;

/// Run reports (text, JSON, JUnit XML)
pub mod reporter;

/// Declarative YAML suites
pub mod script;

pub use app::{
    Application, ConsoleLevel, ConsoleMessage, DomEvent, EventEffect, EventKind,
};
pub use assertion::{evaluate, expect, ElementState, Expectation, Predicate, Subject};
pub use dom::{Document, El, Element, NodeId};
pub use harness::{
    SessionFactory, SuiteResults, TestBody, TestCase, TestHarness, TestResult, TestStatus,
    TestSuite,
};
pub use interaction::{DispatchOutcome, DragOptions, DragProtocol, DragReport};
pub use network::{
    Backend, HttpMethod, HttpRequest, HttpResponse, InterceptRule, Interceptor, Network,
    NotFoundBackend, RecordedCall, RuleHandle, RuleState, StubResponse, UrlMatcher, UrlPattern,
};
pub use query::{ElementHandle, Locator, Query};
pub use result::{LanecheckError, LanecheckResult};
pub use selector::{CompiledSelector, Selector};
pub use session::{
    Session, SessionConfig, DEFAULT_AWAIT_TIMEOUT_MS, DEFAULT_READINESS_SELECTOR,
};
pub use wait::{poll, Polled, WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::app::*;
    pub use super::assertion::*;
    pub use super::dom::*;
    pub use super::harness::*;
    pub use super::interaction::*;
    pub use super::network::*;
    pub use super::pipeline::{pipeline_session, BoardFixture, CandidateStore, PipelineApp};
    pub use super::query::*;
    pub use super::reporter::{ReportFormat, RunReport};
    pub use super::result::*;
    pub use super::script::SuiteFile;
    pub use super::selector::*;
    pub use super::session::*;
    pub use super::wait::*;
}
