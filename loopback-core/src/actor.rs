//! Single-threaded event actor
//!
//! One task owns the frame origin cache and the rule registry and applies
//! browser events strictly in delivery order. Request dispatch runs inside
//! the same loop as a synchronous call; callers get the decision back over a
//! oneshot channel.

use crate::admin::Metrics;
use crate::frames::{CacheSnapshot, FrameEntry, FrameId, FrameOriginCache, TabId, TAB_ID_NONE};
use crate::registry::{Decision, InterceptionRegistry, RequestDetails};
use crate::Result;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inbound events, processed one at a time
#[derive(Debug)]
pub enum BrowserEvent {
    /// Startup inventory: one frame of one open tab
    InventoryResult {
        tab_id: TabId,
        frame_id: FrameId,
        url: String,
    },
    /// Startup inventory: the frame listing of one tab
    FrameInventory {
        tab_id: TabId,
        frames: Vec<FrameEntry>,
    },
    NavigationCommitted {
        tab_id: TabId,
        frame_id: FrameId,
        url: String,
    },
    TabClosed {
        tab_id: TabId,
    },
    OutgoingRequest {
        details: RequestDetails,
        reply: oneshot::Sender<Decision>,
    },
    ResolveOwner {
        tab_id: TabId,
        frame_id: FrameId,
        reply: oneshot::Sender<String>,
    },
    Snapshot {
        reply: oneshot::Sender<CacheSnapshot>,
    },
}

/// Owner of all interception state
#[derive(Debug)]
pub struct InterceptorActor {
    frames: FrameOriginCache,
    registry: InterceptionRegistry,
    metrics: Arc<Metrics>,
}

impl InterceptorActor {
    pub fn new(registry: InterceptionRegistry) -> Self {
        let metrics = registry.metrics().clone();
        Self {
            frames: FrameOriginCache::new(),
            registry,
            metrics,
        }
    }

    pub fn frames(&self) -> &FrameOriginCache {
        &self.frames
    }

    pub fn registry(&self) -> &InterceptionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Apply one event to completion
    pub fn handle_event(&mut self, event: BrowserEvent) {
        self.metrics.events_processed.fetch_add(1, Ordering::Relaxed);

        match event {
            BrowserEvent::InventoryResult {
                tab_id,
                frame_id,
                url,
            } => {
                if tab_id == TAB_ID_NONE {
                    return;
                }
                debug!("Inventory: tab {} frame {} -> {}", tab_id, frame_id, url);
                self.frames.on_inventory_scan(tab_id, frame_id, &url);
            }
            BrowserEvent::FrameInventory { tab_id, frames } => {
                if tab_id == TAB_ID_NONE {
                    return;
                }
                debug!("Frame inventory: tab {} ({} frames)", tab_id, frames.len());
                self.frames.on_frame_inventory(tab_id, &frames);
            }
            BrowserEvent::NavigationCommitted {
                tab_id,
                frame_id,
                url,
            } => {
                debug!("Navigation committed: tab {} frame {} -> {}", tab_id, frame_id, url);
                self.frames.on_navigation_committed(tab_id, frame_id, &url);
            }
            BrowserEvent::TabClosed { tab_id } => {
                debug!("Tab {} closed", tab_id);
                self.frames.on_tab_closed(tab_id);
            }
            BrowserEvent::OutgoingRequest { details, reply } => {
                let decision = self.registry.dispatch(&self.frames, &details);
                // The requester may have given up; the decision is simply dropped
                let _ = reply.send(decision);
            }
            BrowserEvent::ResolveOwner {
                tab_id,
                frame_id,
                reply,
            } => {
                let _ = reply.send(self.frames.resolve(tab_id, frame_id));
            }
            BrowserEvent::Snapshot { reply } => {
                let _ = reply.send(self.frames.snapshot());
            }
        }

        self.update_gauges();
    }

    fn update_gauges(&self) {
        self.metrics
            .tracked_tabs
            .store(self.frames.tab_count() as u64, Ordering::Relaxed);
        self.metrics
            .tracked_frames
            .store(self.frames.frame_count() as u64, Ordering::Relaxed);
    }

    /// Process events until every handle is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<BrowserEvent>) {
        info!("Interceptor started with {} rules", self.registry.len());
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        info!("Interceptor stopped: event channel closed");
    }

    /// Spawn the actor loop on the current runtime
    pub fn spawn(self, capacity: usize) -> (InterceptorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (InterceptorHandle { tx }, task)
    }
}

/// Cloneable sender side of the actor
#[derive(Debug, Clone)]
pub struct InterceptorHandle {
    tx: mpsc::Sender<BrowserEvent>,
}

impl InterceptorHandle {
    /// A handle that does not keep the actor running
    pub fn downgrade(&self) -> WeakInterceptorHandle {
        WeakInterceptorHandle {
            tx: self.tx.downgrade(),
        }
    }

    pub async fn send(&self, event: BrowserEvent) -> Result<()> {
        self.tx.send(event).await?;
        Ok(())
    }

    pub async fn inventory_result(&self, tab_id: TabId, frame_id: FrameId, url: impl Into<String>) -> Result<()> {
        self.send(BrowserEvent::InventoryResult {
            tab_id,
            frame_id,
            url: url.into(),
        })
        .await
    }

    pub async fn frame_inventory(&self, tab_id: TabId, frames: Vec<FrameEntry>) -> Result<()> {
        self.send(BrowserEvent::FrameInventory { tab_id, frames }).await
    }

    pub async fn navigation_committed(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        url: impl Into<String>,
    ) -> Result<()> {
        self.send(BrowserEvent::NavigationCommitted {
            tab_id,
            frame_id,
            url: url.into(),
        })
        .await
    }

    pub async fn tab_closed(&self, tab_id: TabId) -> Result<()> {
        self.send(BrowserEvent::TabClosed { tab_id }).await
    }

    /// Submit an outgoing request and wait for the decision
    pub async fn dispatch(&self, details: RequestDetails) -> Result<Decision> {
        let (reply, rx) = oneshot::channel();
        self.send(BrowserEvent::OutgoingRequest { details, reply }).await?;
        Ok(rx.await?)
    }

    /// Like [`dispatch`](Self::dispatch), but any failure means "no interception"
    pub async fn decide(&self, details: RequestDetails) -> Decision {
        let request_id = details.request_id.clone();
        match self.dispatch(details).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Request {} proceeds unintercepted: {}", request_id, e);
                Decision::Proceed
            }
        }
    }

    pub async fn resolve_owner_url(&self, tab_id: TabId, frame_id: FrameId) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(BrowserEvent::ResolveOwner {
            tab_id,
            frame_id,
            reply,
        })
        .await?;
        Ok(rx.await?)
    }

    pub async fn snapshot(&self) -> Result<CacheSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(BrowserEvent::Snapshot { reply }).await?;
        Ok(rx.await?)
    }
}

/// Observer handle for the actor.
///
/// The actor stops once every [`InterceptorHandle`] is gone, whatever weak
/// handles remain.
#[derive(Debug, Clone)]
pub struct WeakInterceptorHandle {
    tx: mpsc::WeakSender<BrowserEvent>,
}

impl WeakInterceptorHandle {
    /// `None` once the actor has no strong handles left
    pub fn upgrade(&self) -> Option<InterceptorHandle> {
        self.tx.upgrade().map(|tx| InterceptorHandle { tx })
    }
}
