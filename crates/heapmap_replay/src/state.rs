//! State reconstructed during replay.

use heapmap_log::Event;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Allocations issued and not yet freed, keyed by start address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveSet {
    allocations: BTreeMap<u64, u64>,
}

/// Inconsistency found in the recorded trace.
///
/// Replay continues after either one: a double allocation overwrites the
/// previous entry, an unmatched free changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayDiagnostic {
    /// An address was allocated again before being freed
    DoubleAllocation {
        /// Index of the offending event
        step: usize,
        /// Address allocated twice
        pointer: u64,
        /// Size of the allocation that was never freed
        previous_size: u64,
        /// Size of the new allocation
        size: u64,
    },
    /// A free for an address that is not live
    UnmatchedFree {
        /// Index of the offending event
        step: usize,
        /// Address freed
        pointer: u64,
    },
}

impl ReplayDiagnostic {
    /// Index of the event that produced the diagnostic
    #[must_use]
    pub const fn step(&self) -> usize {
        match self {
            Self::DoubleAllocation { step, .. } | Self::UnmatchedFree { step, .. } => *step,
        }
    }
}

impl fmt::Display for ReplayDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleAllocation {
                step,
                pointer,
                previous_size,
                size,
            } => write!(
                f,
                "step {}: 0x{:x} allocated ({} bytes) while still holding {} bytes",
                step, pointer, size, previous_size
            ),
            Self::UnmatchedFree { step, pointer } => {
                write!(f, "step {}: free of 0x{:x} which is not live", step, pointer)
            }
        }
    }
}

impl LiveSet {
    /// Empty live set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the event at index `step`
    pub fn apply(&mut self, step: usize, event: &Event) -> Option<ReplayDiagnostic> {
        match *event {
            Event::Allocation { size, pointer } => self.allocations.insert(pointer, size).map(
                |previous_size| ReplayDiagnostic::DoubleAllocation {
                    step,
                    pointer,
                    previous_size,
                    size,
                },
            ),
            Event::Free { pointer } => match self.allocations.remove(&pointer) {
                Some(_) => None,
                None => Some(ReplayDiagnostic::UnmatchedFree { step, pointer }),
            },
        }
    }

    /// Size of the live allocation at `pointer`
    #[must_use]
    pub fn get(&self, pointer: u64) -> Option<u64> {
        self.allocations.get(&pointer).copied()
    }

    /// Number of live allocations
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// True when nothing is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// `(pointer, size)` pairs in address order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.allocations.iter().map(|(&p, &s)| (p, s))
    }

    /// Sum of live allocation sizes
    #[must_use]
    pub fn total_bytes(&self) -> u128 {
        self.allocations.values().map(|&s| u128::from(s)).sum()
    }
}

/// Engine output for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    /// Number of events applied
    pub step: usize,
    /// Allocations live after `step` events
    pub live: LiveSet,
    /// Bytes in use per dense page index
    pub pages: Vec<u64>,
    /// Event the next step would apply
    pub pending: Option<Event>,
    /// Pages the pending event touches
    pub pending_touched: BTreeSet<usize>,
    /// Diagnostics raised by events before `step`
    pub diagnostics: Vec<ReplayDiagnostic>,
    /// Diagnostics raised in total, including any dropped by the cap
    pub diagnostics_total: usize,
}

impl StepState {
    /// Description of the pending event, or "none" at the end of the log
    #[must_use]
    pub fn pending_description(&self) -> String {
        self.pending
            .as_ref()
            .map_or_else(|| "none".to_string(), Event::describe)
    }

    /// Sum of per-page occupancy
    #[must_use]
    pub fn occupied_bytes(&self) -> u128 {
        self.pages.iter().map(|&b| u128::from(b)).sum()
    }

    /// `(index, bytes)` of every page with live bytes
    pub fn occupied_pages(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.pages
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, bytes)| bytes > 0)
    }
}
