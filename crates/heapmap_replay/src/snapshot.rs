//! Periodic live-set snapshots for faster seeking.

use crate::state::LiveSet;
use serde::{Deserialize, Serialize};

/// Live set recorded at a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Events applied when the snapshot was taken
    pub step: usize,
    /// Live allocations at `step`
    pub live: LiveSet,
    /// Timeline diagnostics raised before `step`
    pub diagnostics_len: usize,
}

/// Snapshots every `interval` steps, starting at step 0
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotIndex {
    interval: usize,
    snapshots: Vec<Snapshot>,
}

impl SnapshotIndex {
    /// Empty index; an interval of 0 disables snapshots
    #[must_use]
    pub fn new(interval: usize) -> Self {
        Self {
            interval,
            snapshots: Vec::new(),
        }
    }

    /// Whether a snapshot belongs at `step`
    #[must_use]
    pub const fn is_due(&self, step: usize) -> bool {
        self.interval > 0 && step % self.interval == 0
    }

    /// Record a snapshot. Steps must be offered in increasing order.
    pub fn record(&mut self, step: usize, live: &LiveSet, diagnostics_len: usize) {
        if !self.is_due(step) {
            return;
        }
        if self.snapshots.last().is_some_and(|s| s.step >= step) {
            return;
        }
        self.snapshots.push(Snapshot {
            step,
            live: live.clone(),
            diagnostics_len,
        });
    }

    /// Latest snapshot at or before `step`
    #[must_use]
    pub fn nearest(&self, step: usize) -> Option<&Snapshot> {
        let i = self.snapshots.partition_point(|s| s.step <= step);
        i.checked_sub(1).and_then(|i| self.snapshots.get(i))
    }

    /// Number of snapshots taken
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True when no snapshot was taken
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
