//! Pages touched by a single event.

use crate::page_map::PageMap;
use crate::state::LiveSet;
use heapmap_core::PageSpan;
use heapmap_log::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Read-only view answering which pages the event at a step touches
#[derive(Debug, Clone, Copy)]
pub struct TouchedTracker<'a> {
    events: &'a [Event],
    page_map: &'a PageMap,
}

impl<'a> TouchedTracker<'a> {
    /// Tracker over `events`, indexed through `page_map`
    #[must_use]
    pub fn new(events: &'a [Event], page_map: &'a PageMap) -> Self {
        Self { events, page_map }
    }

    /// Dense indices touched by the event at `step`; empty past the end.
    ///
    /// A free reports only the page holding the freed pointer, and nothing
    /// when that address was never allocated.
    #[must_use]
    pub fn touched_pages(&self, step: usize) -> BTreeSet<usize> {
        self.events
            .get(step)
            .map(|event| self.pages_for(event, None))
            .unwrap_or_default()
    }

    /// Dense indices touched by `event`.
    ///
    /// With the live set from just before the event, a free of a live
    /// allocation reports the allocation's whole span.
    #[must_use]
    pub fn pages_for(&self, event: &Event, live: Option<&LiveSet>) -> BTreeSet<usize> {
        match *event {
            Event::Allocation { size, pointer } => {
                self.page_map.indices_in(PageSpan::of(pointer, size)).collect()
            }
            Event::Free { pointer } => match live.and_then(|l| l.get(pointer)) {
                Some(size) => self.page_map.indices_in(PageSpan::of(pointer, size)).collect(),
                None => self.page_map.index_of_address(pointer).into_iter().collect(),
            },
        }
    }
}

/// Change in touched pages between two consecutive views
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchedDiff {
    /// Touched now, not before
    pub entered: BTreeSet<usize>,
    /// Touched before, not now
    pub left: BTreeSet<usize>,
    /// Touched in both
    pub retained: BTreeSet<usize>,
}

impl TouchedDiff {
    /// Diff from the pages touched in `previous` to those in `current`
    #[must_use]
    pub fn compute(previous: &BTreeSet<usize>, current: &BTreeSet<usize>) -> Self {
        Self {
            entered: current.difference(previous).copied().collect(),
            left: previous.difference(current).copied().collect(),
            retained: current.intersection(previous).copied().collect(),
        }
    }

    /// Whether any page entered or left
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.entered.is_empty() || !self.left.is_empty()
    }
}
