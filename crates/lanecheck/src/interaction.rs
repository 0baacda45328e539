//! Interaction simulator: clicks and protocol-pluggable drag sequences.
//!
//! UI frameworks bind drag-and-drop to different event sets, so the protocol
//! is chosen per call. The full sequence is dispatched synchronously; nothing
//! waits for the application to finish reacting. Callers await consequences
//! through the interceptor or a polling assertion.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::EventKind;
use crate::query::ElementHandle;
use crate::result::{LanecheckError, LanecheckResult};
use crate::session::Session;

/// Event set used to simulate a drag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DragProtocol {
    /// `dragstart` on source, `dragover` then `drop` on target
    #[default]
    #[serde(rename = "native", alias = "native-drag")]
    NativeDrag,
    /// `mousedown` on source, `mousemove` then `mouseup` on target
    #[serde(rename = "pointer")]
    Pointer,
}

impl DragProtocol {
    /// Ordered events: the first goes to the source, the rest to the target
    #[must_use]
    pub const fn events(&self) -> [EventKind; 3] {
        match self {
            Self::NativeDrag => [EventKind::DragStart, EventKind::DragOver, EventKind::Drop],
            Self::Pointer => [EventKind::MouseDown, EventKind::MouseMove, EventKind::MouseUp],
        }
    }

    /// Parse `native`/`native-drag` or `pointer`
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "native-drag" => Some(Self::NativeDrag),
            "pointer" => Some(Self::Pointer),
            _ => None,
        }
    }

    /// Short name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NativeDrag => "native",
            Self::Pointer => "pointer",
        }
    }
}

impl fmt::Display for DragProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly to treat drags nobody listens to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragOptions {
    /// Fail with `InteractionIgnored` when any event in the sequence goes unhandled
    pub require_handled: bool,
}

impl DragOptions {
    /// Strict options
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            require_handled: true,
        }
    }
}

/// One dispatched event and whether a listener consumed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Event type
    pub event: EventKind,
    /// A listener consumed the event
    pub handled: bool,
}

/// Outcome of a simulated drag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragReport {
    /// Protocol used
    pub protocol: DragProtocol,
    /// Per-event outcomes in dispatch order
    pub outcomes: Vec<DispatchOutcome>,
}

impl DragReport {
    /// Every event in the sequence was handled
    #[must_use]
    pub fn handled(&self) -> bool {
        self.outcomes.iter().all(|o| o.handled)
    }
}

impl Session {
    /// Click an element
    pub fn click(&mut self, target: ElementHandle) -> LanecheckResult<DispatchOutcome> {
        self.dispatch(EventKind::Click, target)
    }

    /// Drag `source` onto `target` using the session's drag options
    pub fn simulate_drag(
        &mut self,
        source: ElementHandle,
        target: ElementHandle,
        protocol: DragProtocol,
    ) -> LanecheckResult<DragReport> {
        let options = self.config().drag;
        self.simulate_drag_with(source, target, protocol, options)
    }

    /// Drag `source` onto `target`
    ///
    /// A sequence that no listener fully handles is a probable protocol
    /// mismatch: it is logged as a warning and, with
    /// [`DragOptions::require_handled`], fails with `InteractionIgnored`.
    pub fn simulate_drag_with(
        &mut self,
        source: ElementHandle,
        target: ElementHandle,
        protocol: DragProtocol,
        options: DragOptions,
    ) -> LanecheckResult<DragReport> {
        self.check_handle(source)?;
        self.check_handle(target)?;

        let [start, over, end] = protocol.events();
        let outcomes = vec![
            self.dispatch(start, source)?,
            self.dispatch(over, target)?,
            self.dispatch(end, target)?,
        ];
        let report = DragReport { protocol, outcomes };

        if !report.handled() {
            tracing::warn!(
                session = %self.id(),
                %protocol,
                outcomes = ?report.outcomes,
                "drag sequence was not handled; the page may listen for a different protocol"
            );
            if options.require_handled {
                return Err(LanecheckError::InteractionIgnored {
                    protocol: protocol.to_string(),
                });
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sequences() {
        assert_eq!(
            DragProtocol::NativeDrag.events(),
            [EventKind::DragStart, EventKind::DragOver, EventKind::Drop]
        );
        assert_eq!(
            DragProtocol::Pointer.events(),
            [EventKind::MouseDown, EventKind::MouseMove, EventKind::MouseUp]
        );
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!(DragProtocol::parse("Native-Drag"), Some(DragProtocol::NativeDrag));
        assert_eq!(DragProtocol::parse("pointer"), Some(DragProtocol::Pointer));
        assert_eq!(DragProtocol::parse("touch"), None);
        let p: DragProtocol = serde_json::from_str("\"pointer\"").unwrap();
        assert_eq!(p, DragProtocol::Pointer);
        assert_eq!(serde_json::to_string(&DragProtocol::NativeDrag).unwrap(), "\"native\"");
    }

    #[test]
    fn test_report_handled_requires_every_event() {
        let outcome = |event, handled| DispatchOutcome { event, handled };
        let report = DragReport {
            protocol: DragProtocol::NativeDrag,
            outcomes: vec![
                outcome(EventKind::DragStart, true),
                outcome(EventKind::DragOver, false),
                outcome(EventKind::Drop, true),
            ],
        };
        assert!(!report.handled());
    }

    #[test]
    fn test_default_options_are_lenient() {
        assert!(!DragOptions::default().require_handled);
        assert!(DragOptions::strict().require_handled);
    }
}
