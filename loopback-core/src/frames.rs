//! Frame origin cache
//!
//! Tracks, for every open tab, the URL currently loaded in each of its frames
//! so that an outgoing request can be attributed to the page that owns it.
//! The cache is volatile: it is rebuilt from a fresh inventory scan plus live
//! navigation events whenever the process starts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Tab identifier as reported by the browser
pub type TabId = i64;

/// Frame identifier, unique within a tab. `0` is the top-level frame.
pub type FrameId = i64;

/// Tab id the browser uses for requests that do not belong to a tab
pub const TAB_ID_NONE: TabId = -1;

/// Frame id of the top-level document
pub const TOP_FRAME: FrameId = 0;

/// Composite identifier of a frame inside a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameKey {
    pub tab_id: TabId,
    pub frame_id: FrameId,
}

impl FrameKey {
    pub fn new(tab_id: TabId, frame_id: FrameId) -> Self {
        Self { tab_id, frame_id }
    }
}

/// One entry of a per-tab frame listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub frame_id: FrameId,
    pub url: String,
}

/// Mapping from tab id to the last known URL of each of its frames
#[derive(Debug, Default, Clone)]
pub struct FrameOriginCache {
    tabs: HashMap<TabId, HashMap<FrameId, String>>,
}

impl FrameOriginCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the URL of the page owning a frame.
    ///
    /// Unknown tabs and frames resolve to an empty string.
    pub fn resolve(&self, tab_id: TabId, frame_id: FrameId) -> String {
        self.resolve_ref(tab_id, frame_id).to_string()
    }

    /// Borrowing variant of [`resolve`](Self::resolve)
    pub fn resolve_ref(&self, tab_id: TabId, frame_id: FrameId) -> &str {
        self.tabs
            .get(&tab_id)
            .and_then(|frames| frames.get(&frame_id))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Read-only accessor for handlers that need page context
    pub fn resolve_owner_url(&self, key: FrameKey) -> String {
        self.resolve(key.tab_id, key.frame_id)
    }

    /// Record an inventory scan result.
    ///
    /// Only fills entries that do not exist yet (an empty URL counts as
    /// missing), so a navigation committed after the scan was issued is
    /// never clobbered by the stale snapshot.
    pub fn on_inventory_scan(&mut self, tab_id: TabId, frame_id: FrameId, url: &str) {
        let frames = self.tabs.entry(tab_id).or_default();
        fill_if_missing(frames, frame_id, url);
    }

    /// Record a per-tab frame listing from the inventory scan.
    ///
    /// The listing is dropped if the tab is no longer tracked: it was closed
    /// between the tab inventory and the frame query. Returns whether the
    /// listing was applied.
    pub fn on_frame_inventory(&mut self, tab_id: TabId, entries: &[FrameEntry]) -> bool {
        let Some(frames) = self.tabs.get_mut(&tab_id) else {
            debug!("Dropping frame inventory for untracked tab {}", tab_id);
            return false;
        };
        for entry in entries {
            fill_if_missing(frames, entry.frame_id, &entry.url);
        }
        true
    }

    /// Record a committed navigation. Last committed navigation wins.
    pub fn on_navigation_committed(&mut self, tab_id: TabId, frame_id: FrameId, url: &str) {
        self.tabs
            .entry(tab_id)
            .or_default()
            .insert(frame_id, url.to_string());
    }

    /// Forget everything about a closed tab
    pub fn on_tab_closed(&mut self, tab_id: TabId) {
        if let Some(frames) = self.tabs.remove(&tab_id) {
            debug!("Freed {} frame entries of closed tab {}", frames.len(), tab_id);
        }
    }

    /// Number of tracked tabs
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Number of tracked frames across all tabs
    pub fn frame_count(&self) -> usize {
        self.tabs.values().map(HashMap::len).sum()
    }

    /// Whether a tab currently has a sub-mapping
    pub fn is_tracked(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    /// Copy of the cache contents, ordered by tab then frame
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut tabs: Vec<TabSnapshot> = self
            .tabs
            .iter()
            .map(|(tab_id, frames)| {
                let mut frames: Vec<FrameEntry> = frames
                    .iter()
                    .map(|(frame_id, url)| FrameEntry {
                        frame_id: *frame_id,
                        url: url.clone(),
                    })
                    .collect();
                frames.sort_by_key(|f| f.frame_id);
                TabSnapshot {
                    tab_id: *tab_id,
                    frames,
                }
            })
            .collect();
        tabs.sort_by_key(|t| t.tab_id);
        CacheSnapshot { tabs }
    }
}

fn fill_if_missing(frames: &mut HashMap<FrameId, String>, frame_id: FrameId, url: &str) {
    let slot = frames.entry(frame_id).or_default();
    if slot.is_empty() {
        slot.push_str(url);
    }
}

/// Serializable view of the cache, used by debug tooling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub tabs: Vec<TabSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub tab_id: TabId,
    pub frames: Vec<FrameEntry>,
}
