//! Checkpoint list for coarse navigation over steps.

use serde::{Deserialize, Serialize};

/// Strictly increasing list of checkpoint steps.
///
/// Always starts at `0` and ends at the event count, so seeking to the
/// nearest checkpoint never runs off either end of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointList {
    steps: Vec<usize>,
}

impl CheckpointList {
    /// Build from checkpoint marker positions.
    ///
    /// Each marker is the number of events preceding it. Markers beyond
    /// `event_count` are clamped; duplicates collapse.
    #[must_use]
    pub fn from_markers(markers: impl IntoIterator<Item = usize>, event_count: usize) -> Self {
        let mut steps = Vec::new();
        steps.push(0);
        steps.extend(markers.into_iter().map(|m| m.min(event_count)));
        steps.push(event_count);
        steps.sort_unstable();
        steps.dedup();
        Self { steps }
    }

    /// Greatest checkpoint strictly less than `step`, or `0`
    #[must_use]
    pub fn previous(&self, step: usize) -> usize {
        let i = self.steps.partition_point(|&c| c < step);
        if i == 0 { 0 } else { self.steps[i - 1] }
    }

    /// Least checkpoint strictly greater than `step`, or the event count
    #[must_use]
    pub fn next(&self, step: usize) -> usize {
        let i = self.steps.partition_point(|&c| c <= step);
        self.steps.get(i).copied().unwrap_or_else(|| self.event_count())
    }

    /// Last entry, the total event count
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.steps.last().copied().unwrap_or(0)
    }

    /// Whether `step` is a checkpoint
    #[must_use]
    pub fn contains(&self, step: usize) -> bool {
        self.steps.binary_search(&step).is_ok()
    }

    /// All checkpoint steps, sentinels included
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.steps
    }

    /// Number of checkpoints, sentinels included
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true once built, `0` is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate checkpoint steps in increasing order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().copied()
    }
}
