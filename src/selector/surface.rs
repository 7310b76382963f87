//! The page surface a selection session draws on and listens to.
//!
//! A [`PageSurface`] is the smallest slice of a page the selector needs:
//! insert/update/remove overlay nodes and attach/detach event listeners.
//! The session records every handle it gets back so it can undo all of them
//! on any terminal transition.

use crate::error::SelectorError;
use crate::geometry::{Point, Rect};

/// Handle to an inserted overlay node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// Handle to an attached event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Visual contract of the full-viewport layer.
pub const LAYER_BACKGROUND: &str = "rgba(0, 0, 0, 0.3)";
pub const LAYER_CURSOR: &str = "crosshair";
/// Topmost stacking order: above page content, below nothing.
pub const LAYER_Z_INDEX: i32 = i32::MAX;

/// Visual contract of the drag rectangle.
pub const BOX_BORDER: &str = "2px dashed #4285f4";
pub const BOX_FILL: &str = "rgba(66, 133, 244, 0.1)";

/// Overlay nodes a session may insert.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayNode {
    /// Full-viewport, semi-transparent layer that intercepts pointer input.
    Layer {
        background: &'static str,
        cursor: &'static str,
        z_index: i32,
    },
    /// The tinted, dashed drag rectangle.
    SelectionBox {
        rect: Rect,
        border: &'static str,
        fill: &'static str,
    },
}

impl OverlayNode {
    pub fn layer() -> Self {
        OverlayNode::Layer {
            background: LAYER_BACKGROUND,
            cursor: LAYER_CURSOR,
            z_index: LAYER_Z_INDEX,
        }
    }

    pub fn selection_box(rect: Rect) -> Self {
        OverlayNode::SelectionBox {
            rect,
            border: BOX_BORDER,
            fill: BOX_FILL,
        }
    }

    pub fn is_layer(&self) -> bool {
        matches!(self, OverlayNode::Layer { .. })
    }
}

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    /// The overlay layer itself.
    Overlay,
    /// The whole document.
    Document,
}

/// Event kinds a session listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    KeyDown,
}

/// Keys the selector distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other(String),
}

/// An input event delivered to a page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    KeyDown(Key),
}

impl PageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PageEvent::PointerDown(_) => EventKind::PointerDown,
            PageEvent::PointerMove(_) => EventKind::PointerMove,
            PageEvent::PointerUp(_) => EventKind::PointerUp,
            PageEvent::KeyDown(_) => EventKind::KeyDown,
        }
    }
}

/// The page-side operations a selection session depends on.
pub trait PageSurface {
    /// Insert a node on top of the page.
    fn insert_node(&mut self, node: OverlayNode) -> Result<NodeId, SelectorError>;

    /// Reposition the selection box. Unknown ids are ignored.
    fn update_node(&mut self, id: NodeId, rect: Rect);

    /// Remove a node. Unknown ids are ignored.
    fn remove_node(&mut self, id: NodeId);

    fn add_listener(
        &mut self,
        target: ListenerTarget,
        kind: EventKind,
    ) -> Result<ListenerId, SelectorError>;

    /// Detach a listener. Unknown ids are ignored.
    fn remove_listener(&mut self, id: ListenerId);

    /// True when a selection overlay layer is currently present.
    fn has_overlay(&self) -> bool;
}
