//! In-page rectangle picker.
//!
//! A [`SelectionSession`] is created once per injection. It draws a
//! full-viewport overlay, follows a single pointer drag, and ends in exactly
//! one terminal state:
//!
//! ```text
//!            pointer-down              pointer-up (w>10 && h>10)
//!   Idle ─────────────────▶ Dragging ───────────────────────────▶ Emitted
//!    │                        │  ▲ │
//!    │ Escape                 │  └─┘ pointer-move
//!    │                        │ pointer-up (too small)
//!    ▼                        ▼
//!  Cancelled ◀── Escape ── Discarded
//! ```
//!
//! Every terminal transition runs the same cleanup: detach every listener
//! the session attached and remove every node it inserted. The outcome is
//! sent to the coordinator as a one-way [`SelectorMessage`]; the session
//! never waits for a reply.
//!
//! The state machine is synchronous. Its only suspension points are the
//! host's own event dispatch.

pub mod surface;

use crate::coordinator::{Outbox, RequestId};
use crate::error::SelectorError;
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};
use surface::{EventKind, Key, ListenerId, ListenerTarget, NodeId, OverlayNode, PageEvent, PageSurface};
use tracing::{debug, warn};

/// Why a session ended without a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Released with at least one dimension at or below the threshold.
    BelowThreshold,
    /// Escape pressed.
    Cancelled,
    /// The page went away before the gesture finished.
    TabClosed,
}

/// The one outbound notification a session sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectorMessage {
    AreaSelected { request: RequestId, rect: Rect },
    SelectionAborted { request: RequestId, reason: AbortReason },
}

impl SelectorMessage {
    pub fn request(&self) -> RequestId {
        match self {
            SelectorMessage::AreaSelected { request, .. }
            | SelectorMessage::SelectionAborted { request, .. } => *request,
        }
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionOutcome {
    Emitted(Rect),
    Discarded(Rect),
    Cancelled,
}

/// Gesture state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Dragging { anchor: Point, rect: Rect },
    Finished(SelectionOutcome),
}

/// One selection gesture, from injection to cleanup.
#[derive(Debug)]
pub struct SelectionSession {
    request: RequestId,
    outbox: Outbox,
    threshold: f64,
    state: GestureState,
    nodes: Vec<NodeId>,
    selection_box: Option<NodeId>,
    listeners: Vec<ListenerId>,
}

impl SelectionSession {
    /// Inject the overlay and arm the session.
    ///
    /// On error nothing the session inserted is left on the page.
    pub fn start(
        surface: &mut dyn PageSurface,
        request: RequestId,
        outbox: Outbox,
        threshold: f64,
    ) -> Result<Self, SelectorError> {
        if surface.has_overlay() {
            return Err(SelectorError::AlreadyActive);
        }

        let mut session = Self {
            request,
            outbox,
            threshold,
            state: GestureState::Idle,
            nodes: Vec::new(),
            selection_box: None,
            listeners: Vec::new(),
        };

        if let Err(e) = session.inject(surface) {
            warn!("Selector injection failed for {}: {}", request, e);
            session.cleanup(surface);
            return Err(e);
        }

        debug!("Selection session {} armed", request);
        Ok(session)
    }

    fn inject(&mut self, surface: &mut dyn PageSurface) -> Result<(), SelectorError> {
        let layer = surface.insert_node(OverlayNode::layer())?;
        self.nodes.push(layer);
        let down = surface.add_listener(ListenerTarget::Overlay, EventKind::PointerDown)?;
        self.listeners.push(down);
        let key = surface.add_listener(ListenerTarget::Document, EventKind::KeyDown)?;
        self.listeners.push(key);
        Ok(())
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    /// End an unfinished session whose page is already gone.
    ///
    /// The page is not touched. The coordinator is still told, so it can
    /// release the tab.
    pub fn abandon(self) {
        if !self.is_finished() {
            debug!("Session {} abandoned with its page", self.request);
            self.outbox.send(SelectorMessage::SelectionAborted {
                request: self.request,
                reason: AbortReason::TabClosed,
            });
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, GestureState::Finished(_))
    }

    /// Feed one event through the state machine.
    ///
    /// Returns the outcome on the transition into a terminal state, `None`
    /// otherwise (including for every event after the session finished).
    pub fn handle(
        &mut self,
        surface: &mut dyn PageSurface,
        event: &PageEvent,
    ) -> Option<SelectionOutcome> {
        match (self.state, event) {
            (GestureState::Finished(_), _) => None,

            (_, PageEvent::KeyDown(Key::Escape)) => {
                Some(self.finish(surface, SelectionOutcome::Cancelled))
            }

            (GestureState::Idle, PageEvent::PointerDown(p)) => {
                if let Err(e) = self.begin_drag(surface, p.clamped()) {
                    // A half-armed drag is worse than none: abort the session.
                    warn!("Could not start drag for {}: {}", self.request, e);
                    return Some(self.finish(surface, SelectionOutcome::Cancelled));
                }
                None
            }

            // Only one drag per session.
            (GestureState::Dragging { .. }, PageEvent::PointerDown(_)) => None,

            (GestureState::Dragging { anchor, .. }, PageEvent::PointerMove(p)) => {
                let rect = Rect::spanning(anchor, p.clamped());
                if let Some(id) = self.selection_box {
                    surface.update_node(id, rect);
                }
                self.state = GestureState::Dragging { anchor, rect };
                None
            }

            (GestureState::Dragging { anchor, .. }, PageEvent::PointerUp(p)) => {
                let rect = Rect::spanning(anchor, p.clamped());
                let outcome = if rect.exceeds(self.threshold) {
                    SelectionOutcome::Emitted(rect)
                } else {
                    SelectionOutcome::Discarded(rect)
                };
                Some(self.finish(surface, outcome))
            }

            _ => None,
        }
    }

    fn begin_drag(&mut self, surface: &mut dyn PageSurface, anchor: Point) -> Result<(), SelectorError> {
        let rect = Rect::at(anchor);
        let id = surface.insert_node(OverlayNode::selection_box(rect))?;
        self.nodes.push(id);
        self.selection_box = Some(id);

        let mv = surface.add_listener(ListenerTarget::Document, EventKind::PointerMove)?;
        self.listeners.push(mv);
        let up = surface.add_listener(ListenerTarget::Document, EventKind::PointerUp)?;
        self.listeners.push(up);

        self.state = GestureState::Dragging { anchor, rect };
        Ok(())
    }

    fn finish(&mut self, surface: &mut dyn PageSurface, outcome: SelectionOutcome) -> SelectionOutcome {
        self.cleanup(surface);
        self.state = GestureState::Finished(outcome);

        let message = match outcome {
            SelectionOutcome::Emitted(rect) => {
                debug!("Session {} emitted {:?}", self.request, rect);
                SelectorMessage::AreaSelected {
                    request: self.request,
                    rect,
                }
            }
            SelectionOutcome::Discarded(rect) => {
                debug!("Session {} discarded {}x{} selection", self.request, rect.width, rect.height);
                SelectorMessage::SelectionAborted {
                    request: self.request,
                    reason: AbortReason::BelowThreshold,
                }
            }
            SelectionOutcome::Cancelled => SelectorMessage::SelectionAborted {
                request: self.request,
                reason: AbortReason::Cancelled,
            },
        };
        self.outbox.send(message);
        outcome
    }

    fn cleanup(&mut self, surface: &mut dyn PageSurface) {
        for id in self.listeners.drain(..) {
            surface.remove_listener(id);
        }
        for id in self.nodes.drain(..) {
            surface.remove_node(id);
        }
        self.selection_box = None;
    }
}
