//! The seam between a session and the application under test.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dom::{Document, NodeId};
use crate::network::Network;
use crate::result::LanecheckResult;

/// DOM event types the simulator can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// `click`
    Click,
    /// `dragstart`
    DragStart,
    /// `dragover`
    DragOver,
    /// `drop`
    Drop,
    /// `mousedown`
    MouseDown,
    /// `mousemove`
    MouseMove,
    /// `mouseup`
    MouseUp,
}

impl EventKind {
    /// DOM event name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DragStart => "dragstart",
            Self::DragOver => "dragover",
            Self::Drop => "drop",
            Self::MouseDown => "mousedown",
            Self::MouseMove => "mousemove",
            Self::MouseUp => "mouseup",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event targeted at one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomEvent {
    /// Event type
    pub kind: EventKind,
    /// Target element
    pub target: NodeId,
}

impl DomEvent {
    /// Create an event
    #[must_use]
    pub const fn new(kind: EventKind, target: NodeId) -> Self {
        Self { kind, target }
    }
}

/// What the application did with a dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventEffect {
    /// A listener consumed the event
    pub handled: bool,
    /// The application asked to navigate to this path
    pub navigate: Option<String>,
}

impl EventEffect {
    /// No listener consumed the event
    #[must_use]
    pub const fn ignored() -> Self {
        Self {
            handled: false,
            navigate: None,
        }
    }

    /// A listener consumed the event
    #[must_use]
    pub const fn handled() -> Self {
        Self {
            handled: true,
            navigate: None,
        }
    }

    /// A listener consumed the event and requested navigation
    #[must_use]
    pub fn navigate(path: impl Into<String>) -> Self {
        Self {
            handled: true,
            navigate: Some(path.into()),
        }
    }
}

/// Console severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// `console.log`
    Log,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

/// A console message logged by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Severity
    pub level: ConsoleLevel,
    /// Message text
    pub text: String,
}

impl ConsoleMessage {
    /// Error-level message
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: ConsoleLevel::Error,
            text: text.into(),
        }
    }
}

/// Application driven by a session
///
/// All network traffic must go through the supplied [`Network`] so the
/// session's interceptor can observe and stub it. Deferred work (data
/// fetches, update requests after a drop) happens in [`Application::tick`],
/// which the session calls only while a test is suspended on a wait.
pub trait Application {
    /// Render the initial document for `path`
    fn render(&mut self, path: &str, network: &mut Network) -> LanecheckResult<Document>;

    /// Deliver an event
    fn dispatch(
        &mut self,
        document: &mut Document,
        event: &DomEvent,
        network: &mut Network,
    ) -> LanecheckResult<EventEffect>;

    /// Run queued work; may mutate the document and issue requests
    fn tick(&mut self, document: &mut Document, network: &mut Network) -> LanecheckResult<()>;

    /// Drain console messages logged since the last call
    fn take_console(&mut self) -> Vec<ConsoleMessage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::DragStart.to_string(), "dragstart");
        assert_eq!(EventKind::MouseUp.as_str(), "mouseup");
    }

    #[test]
    fn test_effects() {
        assert!(!EventEffect::ignored().handled);
        assert!(EventEffect::handled().navigate.is_none());
        let nav = EventEffect::navigate("/positions");
        assert!(nav.handled);
        assert_eq!(nav.navigate.as_deref(), Some("/positions"));
    }

    #[test]
    fn test_console_error() {
        let msg = ConsoleMessage::error("Error updating candidate");
        assert_eq!(msg.level, ConsoleLevel::Error);
    }
}
