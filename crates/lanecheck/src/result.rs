//! Result and error types for Lanecheck.

use thiserror::Error;

/// Result type for Lanecheck operations
pub type LanecheckResult<T> = Result<T, LanecheckError>;

/// Errors that can occur while driving a test session.
///
/// Every variant aborts only the current test; the harness records it at the
/// test boundary and moves on to the next test.
#[derive(Debug, Error)]
pub enum LanecheckError {
    /// Readiness selector never became visible
    #[error("Navigation to {path} timed out after {timeout_ms}ms waiting for {selector}")]
    NavigationTimeout {
        /// Path that was loaded
        path: String,
        /// Readiness selector that never appeared
        selector: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Expected network call never observed
    #[error("No call for {rule} observed within {timeout_ms}ms")]
    InterceptTimeout {
        /// Rule label (alias or pattern)
        rule: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Predicate mismatch
    #[error("Assertion failed: {predicate}: expected {expected}, got {actual}")]
    AssertionFailed {
        /// Predicate name
        predicate: String,
        /// Expected value
        expected: String,
        /// Actual value
        actual: String,
    },

    /// Element handle used after its document was replaced or the node detached
    #[error("Stale element handle: resolved in document generation {handle_generation}, current generation is {current_generation}")]
    StaleHandle {
        /// Generation the handle was resolved in
        handle_generation: u64,
        /// Generation of the live document
        current_generation: u64,
    },

    /// `nth(i)` past the end of the matched elements
    #[error("Index {index} out of range: {selector} matched {len} element(s)")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Number of matches
        len: usize,
        /// Selector description
        selector: String,
    },

    /// Selector could not be parsed
    #[error("Invalid selector {selector:?}: {message}")]
    InvalidSelector {
        /// Selector source
        selector: String,
        /// Parse error
        message: String,
    },

    /// URL pattern of an intercept rule could not be compiled
    #[error("Invalid URL pattern {pattern:?}: {message}")]
    InvalidUrlPattern {
        /// Pattern source
        pattern: String,
        /// Compile error
        message: String,
    },

    /// Drag sequence had no listener on the page
    #[error("No listener handled the {protocol} drag sequence")]
    InteractionIgnored {
        /// Protocol name
        protocol: String,
    },

    /// Rule handle or alias not registered in this session
    #[error("Unknown intercept rule: {rule}")]
    UnknownRule {
        /// Rule label
        rule: String,
    },

    /// Application under test failed to render or handle an event
    #[error("Application error: {message}")]
    Application {
        /// Error message
        message: String,
    },

    /// Suite definition error
    #[error("Suite error: {message}")]
    Suite {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LanecheckError {
    /// Build an assertion failure
    #[must_use]
    pub fn assertion(
        predicate: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::AssertionFailed {
            predicate: predicate.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Build an application error
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            message: message.into(),
        }
    }

    /// Build a suite definition error
    #[must_use]
    pub fn suite(message: impl Into<String>) -> Self {
        Self::Suite {
            message: message.into(),
        }
    }

    /// Stable short name used in reports
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NavigationTimeout { .. } => "NavigationTimeout",
            Self::InterceptTimeout { .. } => "InterceptTimeout",
            Self::AssertionFailed { .. } => "AssertionFailed",
            Self::StaleHandle { .. } => "StaleHandleError",
            Self::OutOfRange { .. } => "OutOfRange",
            Self::InvalidSelector { .. } => "InvalidSelector",
            Self::InvalidUrlPattern { .. } => "InvalidUrlPattern",
            Self::InteractionIgnored { .. } => "InteractionIgnored",
            Self::UnknownRule { .. } => "UnknownRule",
            Self::Application { .. } => "ApplicationError",
            Self::Suite { .. } => "SuiteError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_message() {
        let err = LanecheckError::assertion("count", "3", "2");
        assert_eq!(err.to_string(), "Assertion failed: count: expected 3, got 2");
        assert_eq!(err.kind(), "AssertionFailed");
    }

    #[test]
    fn test_navigation_timeout_message() {
        let err = LanecheckError::NavigationTimeout {
            path: "/positions/1".to_string(),
            selector: "h2".to_string(),
            timeout_ms: 250,
        };
        assert!(err.to_string().contains("/positions/1"));
        assert!(err.to_string().contains("250ms"));
        assert_eq!(err.kind(), "NavigationTimeout");
    }

    #[test]
    fn test_stale_handle_kind() {
        let err = LanecheckError::StaleHandle {
            handle_generation: 1,
            current_generation: 2,
        };
        assert_eq!(err.kind(), "StaleHandleError");
        assert!(err.to_string().contains("generation 1"));
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LanecheckError = io.into();
        assert_eq!(err.kind(), "IoError");
    }
}
