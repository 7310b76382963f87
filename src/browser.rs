//! In-process browser host.
//!
//! [`VirtualBrowser`] stands in for a real browser: it owns tabs, each with a
//! [`VirtualPage`] and a viewport raster. It implements both [`TabHost`] and
//! [`TabRasterizer`], so the coordinator, selector and capturer run against
//! it unchanged. The CLI replays pointer gestures through it and the test
//! suites use it to observe what a session leaves on the page.

use crate::capture::{TabRasterizer, ViewportRaster};
use crate::coordinator::{Outbox, RequestId, TabHost, TabId};
use crate::error::{CaptureError, SelectorError};
use crate::geometry::Rect;
use crate::selector::surface::{
    EventKind, ListenerId, ListenerTarget, NodeId, OverlayNode, PageEvent, PageSurface,
};
use crate::selector::{SelectionOutcome, SelectionSession};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

// ── Page ─────────────────────────────────────────────────────────────────

/// A page surface that records overlay nodes and listeners.
#[derive(Debug, Default)]
pub struct VirtualPage {
    nodes: HashMap<NodeId, OverlayNode>,
    listeners: HashMap<ListenerId, (ListenerTarget, EventKind)>,
    next_id: u64,
    listener_budget: Option<usize>,
}

impl VirtualPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Current geometry of the drag rectangle, if one is on the page.
    pub fn selection_box(&self) -> Option<Rect> {
        self.nodes.values().find_map(|n| match n {
            OverlayNode::SelectionBox { rect, .. } => Some(*rect),
            OverlayNode::Layer { .. } => None,
        })
    }

    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.listeners.values().any(|(_, k)| *k == kind)
    }

    /// Accept `n` more listeners, then reject every further one.
    ///
    /// Simulates a page whose script context dies mid-injection.
    pub fn fail_listeners_after(&mut self, n: usize) {
        self.listener_budget = Some(n);
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl PageSurface for VirtualPage {
    fn insert_node(&mut self, node: OverlayNode) -> Result<NodeId, SelectorError> {
        let id = NodeId(self.next_id());
        self.nodes.insert(id, node);
        Ok(id)
    }

    fn update_node(&mut self, id: NodeId, new_rect: Rect) {
        if let Some(OverlayNode::SelectionBox { rect, .. }) = self.nodes.get_mut(&id) {
            *rect = new_rect;
        }
    }

    fn remove_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
    }

    fn add_listener(
        &mut self,
        target: ListenerTarget,
        kind: EventKind,
    ) -> Result<ListenerId, SelectorError> {
        if let Some(budget) = self.listener_budget.as_mut() {
            if *budget == 0 {
                return Err(SelectorError::InjectionFailed(format!(
                    "page rejected {:?} listener on {:?}",
                    kind, target
                )));
            }
            *budget -= 1;
        }
        let id = ListenerId(self.next_id());
        self.listeners.insert(id, (target, kind));
        Ok(id)
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    fn has_overlay(&self) -> bool {
        self.nodes.values().any(OverlayNode::is_layer)
    }
}

// ── Browser ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct VirtualTab {
    page: VirtualPage,
    session: Option<SelectionSession>,
    raster: ViewportRaster,
}

#[derive(Debug, Default)]
struct BrowserState {
    tabs: BTreeMap<TabId, VirtualTab>,
    active: Option<TabId>,
    next_tab: u64,
}

/// A set of tabs with one active tab.
#[derive(Debug, Default)]
pub struct VirtualBrowser {
    state: Mutex<BrowserState>,
}

impl VirtualBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a tab showing `raster` and make it active.
    pub fn open_tab(&self, raster: ViewportRaster) -> TabId {
        let mut state = self.state();
        state.next_tab += 1;
        let tab = TabId(state.next_tab);
        state.tabs.insert(
            tab,
            VirtualTab {
                page: VirtualPage::new(),
                session: None,
                raster,
            },
        );
        state.active = Some(tab);
        debug!("Opened tab {}", tab);
        tab
    }

    /// Close a tab. Any unfinished session on it is abandoned: the page is
    /// not cleaned up, but the coordinator hears that the tab is gone.
    pub fn close_tab(&self, tab: TabId) {
        let mut state = self.state();
        if let Some(session) = state.tabs.remove(&tab).and_then(|t| t.session) {
            session.abandon();
        }
        if state.active == Some(tab) {
            state.active = state.tabs.keys().next_back().copied();
        }
        debug!("Closed tab {}", tab);
    }

    /// Focus an open tab. Returns false for unknown tabs.
    pub fn activate(&self, tab: TabId) -> bool {
        let mut state = self.state();
        if state.tabs.contains_key(&tab) {
            state.active = Some(tab);
            true
        } else {
            false
        }
    }

    /// Deliver an input event to a tab's page.
    ///
    /// The event reaches the session only if the page has a listener for
    /// its kind, as with real DOM dispatch.
    pub fn dispatch(&self, tab: TabId, event: PageEvent) -> Option<SelectionOutcome> {
        let mut state = self.state();
        let t = state.tabs.get_mut(&tab)?;
        if !t.page.is_listening(event.kind()) {
            trace!("Tab {}: no listener for {:?}", tab, event.kind());
            return None;
        }
        let session = t.session.as_mut()?;
        let outcome = session.handle(&mut t.page, &event);
        if session.is_finished() {
            t.session = None;
        }
        outcome
    }

    /// Number of selection overlay layers on a tab's page.
    pub fn overlay_count(&self, tab: TabId) -> usize {
        self.state()
            .tabs
            .get(&tab)
            .map(|t| t.page.nodes.values().filter(|n| n.is_layer()).count())
            .unwrap_or(0)
    }

    /// `(nodes, listeners)` currently on a tab's page.
    pub fn page_counts(&self, tab: TabId) -> Option<(usize, usize)> {
        self.state()
            .tabs
            .get(&tab)
            .map(|t| (t.page.node_count(), t.page.listener_count()))
    }

    pub fn has_session(&self, tab: TabId) -> bool {
        self.state()
            .tabs
            .get(&tab)
            .is_some_and(|t| t.session.is_some())
    }
}

#[async_trait]
impl TabHost for VirtualBrowser {
    async fn active_tab(&self) -> Option<TabId> {
        self.state().active
    }

    async fn inject_selector(
        &self,
        tab: TabId,
        request: RequestId,
        outbox: Outbox,
        min_selection_px: f64,
    ) -> Result<(), SelectorError> {
        let mut state = self.state();
        let t = state
            .tabs
            .get_mut(&tab)
            .ok_or_else(|| SelectorError::InjectionFailed(format!("tab {} is closed", tab)))?;
        let session = SelectionSession::start(&mut t.page, request, outbox, min_selection_px)?;
        t.session = Some(session);
        Ok(())
    }
}

#[async_trait]
impl TabRasterizer for VirtualBrowser {
    async fn capture_visible(&self, tab: TabId) -> Result<ViewportRaster, CaptureError> {
        self.state()
            .tabs
            .get(&tab)
            .map(|t| t.raster.clone())
            .ok_or_else(|| CaptureError::Unavailable {
                tab,
                detail: "tab is closed".into(),
            })
    }
}
