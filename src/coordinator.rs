//! Session coordination: trigger → selector → capture → store.
//!
//! The coordinator is the only component that talks to all three of the
//! host, the capturer and the store. It owns one piece of state: which
//! request is in flight for which tab.
//!
//! ```text
//! start_capture()              Envelope{tab, AreaSelected}
//!   │ claim tab slot             │ request id matches slot?
//!   │ inject selector            │ capture_region → store.append
//!   ▼                            ▼
//! CaptureTicket               release slot, report status
//! ```
//!
//! Selector messages arrive over an unbounded channel. [`CaptureCoordinator::run`]
//! drains it one envelope at a time, so appends never race each other.

use crate::capture::{self, TabRasterizer};
use crate::config::ScribeConfig;
use crate::error::{SelectorError, TabscribeError};
use crate::geometry::Rect;
use crate::progress::CaptureCallback;
use crate::selector::{AbortReason, SelectorMessage};
use crate::store::ImageStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Opaque handle to a browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one capture attempt, from injection to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request #{}", self.0)
    }
}

/// A selector message tagged with the tab it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub tab: TabId,
    pub message: SelectorMessage,
}

/// One-way sending half handed to a selection session.
///
/// Sending never blocks and never fails from the sender's point of view.
#[derive(Debug, Clone)]
pub struct Outbox {
    tab: TabId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbox {
    pub fn new(tab: TabId, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tab, tx }
    }

    pub fn send(&self, message: SelectorMessage) {
        let envelope = Envelope {
            tab: self.tab,
            message,
        };
        if self.tx.send(envelope).is_err() {
            debug!("Coordinator gone; dropping selector message from tab {}", self.tab);
        }
    }
}

/// Returned by [`CaptureCoordinator::start_capture`] once the selector is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTicket {
    pub tab: TabId,
    pub request: RequestId,
}

/// The browser environment the coordinator drives.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// The tab that currently has focus, if any.
    async fn active_tab(&self) -> Option<TabId>;

    /// Start a selection session in `tab` that reports through `outbox`.
    async fn inject_selector(
        &self,
        tab: TabId,
        request: RequestId,
        outbox: Outbox,
        min_selection_px: f64,
    ) -> Result<(), SelectorError>;
}

/// What [`CaptureCoordinator::handle`] did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The image was appended; the collection now holds `len` images.
    Stored { len: usize },
    Aborted(AbortReason),
    /// Capture, crop, encode or store failed; nothing was stored.
    Failed(String),
    /// Stale or unknown request id.
    Ignored,
}

pub struct CaptureCoordinator {
    host: Arc<dyn TabHost>,
    rasterizer: Arc<dyn TabRasterizer>,
    store: Arc<ImageStore>,
    callback: CaptureCallback,
    min_selection_px: f64,
    tx: mpsc::UnboundedSender<Envelope>,
    in_flight: Mutex<HashMap<TabId, RequestId>>,
    next_request: AtomicU64,
}

impl CaptureCoordinator {
    /// Create a coordinator and the receiver its selectors report to.
    ///
    /// Feed the receiver to [`run`](Self::run), or drive
    /// [`handle`](Self::handle) by hand.
    pub fn new(
        host: Arc<dyn TabHost>,
        rasterizer: Arc<dyn TabRasterizer>,
        store: Arc<ImageStore>,
        config: &ScribeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            host,
            rasterizer,
            store,
            callback: config.capture_callback.clone(),
            min_selection_px: config.min_selection_px,
            tx,
            in_flight: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
        };
        (coordinator, rx)
    }

    /// Begin a capture in the active tab.
    ///
    /// Returns as soon as the selector is injected; the rest of the flow
    /// happens when its message arrives.
    pub async fn start_capture(&self) -> Result<CaptureTicket, TabscribeError> {
        let tab = self.host.active_tab().await.ok_or(TabscribeError::NoActiveTab)?;

        let request = {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains_key(&tab) {
                warn!("Capture already in progress in tab {}", tab);
                return Err(TabscribeError::SelectionInProgress { tab });
            }
            let request = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
            in_flight.insert(tab, request);
            request
        };

        let outbox = Outbox::new(tab, self.tx.clone());
        if let Err(e) = self
            .host
            .inject_selector(tab, request, outbox, self.min_selection_px)
            .await
        {
            self.release(tab, request).await;
            error!("Selector injection failed in tab {}: {}", tab, e);
            self.callback.on_capture_failed(tab, &e.to_string());
            return Err(TabscribeError::InjectionFailed {
                tab,
                detail: e.to_string(),
            });
        }

        info!("Selection started in tab {} ({})", tab, request);
        self.callback.on_selection_started(tab);
        Ok(CaptureTicket { tab, request })
    }

    /// Process one selector message.
    pub async fn handle(&self, envelope: Envelope) -> Handled {
        let Envelope { tab, message } = envelope;
        let request = message.request();

        if !self.is_current(tab, request).await {
            warn!("Ignoring message for stale {} from tab {}", request, tab);
            return Handled::Ignored;
        }

        let handled = match message {
            SelectorMessage::AreaSelected { rect, .. } => {
                self.callback.on_area_selected(tab, rect);
                self.capture_and_store(tab, rect).await
            }
            SelectorMessage::SelectionAborted { reason, .. } => {
                info!("Selection in tab {} ended without capture ({:?})", tab, reason);
                self.callback.on_selection_aborted(tab, reason);
                Handled::Aborted(reason)
            }
        };

        self.release(tab, request).await;
        handled
    }

    async fn capture_and_store(&self, tab: TabId, rect: Rect) -> Handled {
        let image = match capture::capture_region(self.rasterizer.as_ref(), tab, rect).await {
            Ok(image) => image,
            Err(e) => {
                error!("Capture failed in tab {}: {}", tab, e);
                self.callback.on_capture_failed(tab, &e.to_string());
                return Handled::Failed(e.to_string());
            }
        };

        match self.store.append(image).await {
            Ok(len) => {
                info!("Stored capture from tab {} ({} images)", tab, len);
                self.callback.on_image_stored(tab, len);
                Handled::Stored { len }
            }
            Err(e) => {
                error!("Could not store capture from tab {}: {}", tab, e);
                self.callback.on_capture_failed(tab, &e.to_string());
                Handled::Failed(e.to_string())
            }
        }
    }

    /// Drain selector messages until every sender is gone.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            self.handle(envelope).await;
        }
        debug!("Selector channel closed; coordinator stopping");
    }

    /// The request currently in flight for `tab`.
    pub async fn in_flight(&self, tab: TabId) -> Option<RequestId> {
        self.in_flight.lock().await.get(&tab).copied()
    }

    async fn is_current(&self, tab: TabId, request: RequestId) -> bool {
        self.in_flight.lock().await.get(&tab) == Some(&request)
    }

    async fn release(&self, tab: TabId, request: RequestId) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(&tab) == Some(&request) {
            in_flight.remove(&tab);
        }
    }
}
