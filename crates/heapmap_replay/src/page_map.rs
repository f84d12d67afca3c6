//! Dense index space over the pages a log touches.

use heapmap_core::{CoreError, CoreResult, PageSpan, page_of};
use heapmap_log::Event;
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::BTreeSet;

/// Bijection between page numbers and dense indices `0..len()`.
///
/// Indices follow ascending page number. The map is built once per log and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMap {
    pages: IndexSet<u64>,
}

impl PageMap {
    /// Collect every page spanned by every allocation in `events`
    #[must_use]
    pub fn build(events: &[Event]) -> Self {
        let pages: BTreeSet<u64> = events
            .iter()
            .filter_map(Event::allocation_span)
            .flat_map(|span| span.pages())
            .collect();

        tracing::debug!(pages = pages.len(), "built page map");

        Self {
            pages: pages.into_iter().collect(),
        }
    }

    /// Number of distinct pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True when no allocation was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Dense index of a page number
    #[must_use]
    pub fn index_of(&self, page: u64) -> Option<usize> {
        self.pages.get_index_of(&page)
    }

    /// Dense index of the page containing `address`
    #[must_use]
    pub fn index_of_address(&self, address: u64) -> Option<usize> {
        self.index_of(page_of(address))
    }

    /// Page number at a dense index
    #[must_use]
    pub fn page_at(&self, index: usize) -> Option<u64> {
        self.pages.get_index(index).copied()
    }

    /// Dense index of a page that must be present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPage` if the page was never seen while building the
    /// map.
    pub fn require_index(&self, page: u64) -> CoreResult<usize> {
        self.index_of(page).ok_or_else(|| {
            tracing::error!(page, "page missing from page map");
            CoreError::InvalidPage { page }
        })
    }

    /// Dense indices of every page in `span` that the map contains
    pub fn indices_in(&self, span: PageSpan) -> impl Iterator<Item = usize> + '_ {
        span.pages().filter_map(|page| self.index_of(page))
    }

    /// Page numbers in index order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.pages.iter().copied()
    }
}
