//! Work planner
//!
//! Turns the open findings of a ledger into an ordered work queue and keeps
//! the user's plan metadata: pins, skips, clusters, focus and done markers.
//!
//! ```text
//!   ┌────────────┐   pinned_top (manual order)
//!   │ queue      │   rest: tier desc, impact desc, id asc
//!   │            │   pinned_bottom (manual order)
//!   └────────────┘
//! ```
//!
//! Plan operations never change a finding's status. The one exception is
//! [`mark_done`], which routes through the explicit resolution API.

mod operations;
mod queue;

pub use operations::{
    add_to_cluster, auto_cluster, clear_focus, create_cluster, delete_cluster, mark_done,
    move_items, remove_from_cluster, resurface_stale_skips, set_focus, skip_items, unskip_items,
    MovePosition, AUTO_CLUSTER_PREFIX,
};
pub use queue::{build_queue, QueueItem, QueueOptions};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How long a skip lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipKind {
    /// Comes back after `review_after` scans
    Temporary,
    /// Stays skipped; counts as resolved in the lenient score only
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub kind: SkipKind,
    pub note: String,
    /// Ledger scan count when the skip was recorded
    pub skipped_at_scan: u32,
    #[serde(default)]
    pub review_after: Option<u32>,
    pub skipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Created by [`auto_cluster`] rather than by hand
    #[serde(default)]
    pub auto: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneMarker {
    pub note: String,
    pub marked_at: DateTime<Utc>,
}

/// Plan metadata persisted in the state document.
/// Cluster membership lives on the finding itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default)]
    pub pinned_top: Vec<String>,
    #[serde(default)]
    pub pinned_bottom: Vec<String>,
    #[serde(default)]
    pub skips: BTreeMap<String, SkipEntry>,
    #[serde(default)]
    pub clusters: BTreeMap<String, Cluster>,
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub done: BTreeMap<String, DoneMarker>,
}

impl PlanState {
    pub fn is_skipped(&self, id: &str) -> bool {
        self.skips.contains_key(id)
    }

    pub fn is_permanently_skipped(&self, id: &str) -> bool {
        self.skips
            .get(id)
            .is_some_and(|s| s.kind == SkipKind::Permanent)
    }

    pub fn is_done(&self, id: &str) -> bool {
        self.done.contains_key(id)
    }

    pub(crate) fn unpin(&mut self, id: &str) {
        self.pinned_top.retain(|p| p != id);
        self.pinned_bottom.retain(|p| p != id);
    }
}
