//! Replay engine computing the state at any step.

use crate::page_map::PageMap;
use crate::snapshot::SnapshotIndex;
use crate::state::{LiveSet, ReplayDiagnostic, StepState};
use crate::touched::TouchedTracker;
use heapmap_core::{CoreError, CoreResult, PageChunks};
use heapmap_log::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Take a live-set snapshot every N steps (0 = replay from scratch)
    pub snapshot_interval: usize,
    /// Maximum diagnostics kept per state (0 = unlimited)
    pub max_diagnostics: usize,
    /// Report the whole span of a freed allocation as touched
    pub exact_free_span: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 0,
            max_diagnostics: 0,
            exact_free_span: false,
        }
    }
}

/// Replay engine owning one decoded log
pub struct ReplayEngine {
    config: ReplayConfig,
    events: Vec<Event>,
    page_map: PageMap,
    snapshots: SnapshotIndex,
    timeline_diagnostics: Vec<ReplayDiagnostic>,
}

impl ReplayEngine {
    /// Create an engine for `events`.
    ///
    /// Builds the page map and walks the log once to collect the timeline
    /// diagnostics and, when enabled, the snapshot index.
    #[must_use]
    pub fn new(events: Vec<Event>, config: ReplayConfig) -> Self {
        let page_map = PageMap::build(&events);
        let mut snapshots = SnapshotIndex::new(config.snapshot_interval);
        let mut timeline_diagnostics = Vec::new();
        let mut live = LiveSet::new();

        for (step, event) in events.iter().enumerate() {
            snapshots.record(step, &live, timeline_diagnostics.len());
            if let Some(diagnostic) = live.apply(step, event) {
                tracing::warn!(%diagnostic, "inconsistent heap trace");
                timeline_diagnostics.push(diagnostic);
            }
        }
        snapshots.record(events.len(), &live, timeline_diagnostics.len());

        tracing::debug!(
            events = events.len(),
            pages = page_map.len(),
            snapshots = snapshots.len(),
            diagnostics = timeline_diagnostics.len(),
            "replay engine ready"
        );

        Self {
            config,
            events,
            page_map,
            snapshots,
            timeline_diagnostics,
        }
    }

    /// Number of replayable events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of dense page indices
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_map.len()
    }

    /// Decoded events in log order
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Page number to dense index mapping
    #[must_use]
    pub fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    /// Configuration the engine was built with
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Every diagnostic raised over the whole log
    #[must_use]
    pub fn timeline_diagnostics(&self) -> &[ReplayDiagnostic] {
        &self.timeline_diagnostics
    }

    /// Touched-page view over this log
    #[must_use]
    pub fn tracker(&self) -> TouchedTracker<'_> {
        TouchedTracker::new(&self.events, &self.page_map)
    }

    /// Compute the state after the first `step` events.
    ///
    /// # Errors
    ///
    /// Returns `StepOutOfRange` if `step > event_count`, and `InvalidPage`
    /// if a live allocation covers a page the page map does not hold.
    pub fn compute_state(&self, step: usize) -> CoreResult<StepState> {
        if step > self.events.len() {
            return Err(CoreError::StepOutOfRange {
                step,
                event_count: self.events.len(),
            });
        }

        let (mut live, mut diagnostics, start) = match self.snapshots.nearest(step) {
            Some(snapshot) => (
                snapshot.live.clone(),
                self.timeline_diagnostics[..snapshot.diagnostics_len].to_vec(),
                snapshot.step,
            ),
            None => (LiveSet::new(), Vec::new(), 0),
        };

        for (offset, event) in self.events[start..step].iter().enumerate() {
            if let Some(diagnostic) = live.apply(start + offset, event) {
                diagnostics.push(diagnostic);
            }
        }

        let pages = self.occupancy(&live)?;
        let pending = self.events.get(step).copied();
        let pending_touched = pending
            .map(|event| self.tracker().pages_for(&event, Some(&live)))
            .unwrap_or_else(BTreeSet::new);

        let diagnostics_total = diagnostics.len();
        if self.config.max_diagnostics > 0 {
            diagnostics.truncate(self.config.max_diagnostics);
        }

        Ok(StepState {
            step,
            live,
            pages,
            pending,
            pending_touched,
            diagnostics,
            diagnostics_total,
        })
    }

    /// Distribute every live allocation over its pages
    fn occupancy(&self, live: &LiveSet) -> CoreResult<Vec<u64>> {
        let mut pages = vec![0u64; self.page_map.len()];
        for (pointer, size) in live.iter() {
            for chunk in PageChunks::new(pointer, size) {
                let index = self.page_map.require_index(chunk.page)?;
                pages[index] = pages[index].saturating_add(chunk.bytes);
            }
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alloc(size: u64, pointer: u64) -> Event {
        Event::Allocation { size, pointer }
    }

    fn free(pointer: u64) -> Event {
        Event::Free { pointer }
    }

    #[test]
    fn test_replay_config_default() {
        let config = ReplayConfig::default();
        assert_eq!(config.snapshot_interval, 0);
        assert_eq!(config.max_diagnostics, 0);
        assert!(!config.exact_free_span);
    }

    #[test]
    fn test_replay_config_partial_json() {
        let config: ReplayConfig = serde_json::from_str(r#"{"snapshot_interval": 64}"#).unwrap();
        assert_eq!(config.snapshot_interval, 64);
        assert_eq!(config.max_diagnostics, 0);
    }

    #[test]
    fn test_step_zero_is_empty() {
        let engine = ReplayEngine::new(vec![alloc(100, 0x1000)], ReplayConfig::default());
        let state = engine.compute_state(0).unwrap();
        assert!(state.live.is_empty());
        assert_eq!(state.pages, vec![0]);
        assert_eq!(state.pending_description(), "allocate 100 bytes at 0x1000");
    }

    #[test]
    fn test_alloc_then_free_single_page() {
        let engine = ReplayEngine::new(vec![alloc(4096, 0), free(0)], ReplayConfig::default());
        assert_eq!(engine.page_count(), 1);
        assert_eq!(engine.compute_state(1).unwrap().pages, vec![4096]);
        let end = engine.compute_state(2).unwrap();
        assert_eq!(end.pages, vec![0]);
        assert_eq!(end.pending_description(), "none");
    }

    #[test]
    fn test_allocation_across_pages() {
        let engine = ReplayEngine::new(vec![alloc(8192, 4090)], ReplayConfig::default());
        let state = engine.compute_state(1).unwrap();
        assert_eq!(state.pages, vec![6, 4096, 4090]);
        assert_eq!(state.occupied_bytes(), 8192);
    }

    #[test]
    fn test_out_of_range() {
        let engine = ReplayEngine::new(vec![alloc(1, 0)], ReplayConfig::default());
        assert_eq!(
            engine.compute_state(2).unwrap_err(),
            CoreError::StepOutOfRange {
                step: 2,
                event_count: 1
            }
        );
    }

    #[test]
    fn test_unmatched_free_reported() {
        let engine = ReplayEngine::new(vec![alloc(16, 0x40), free(0x9000)], ReplayConfig::default());
        let state = engine.compute_state(2).unwrap();
        assert_eq!(state.pages, vec![16]);
        assert_eq!(
            state.diagnostics,
            vec![ReplayDiagnostic::UnmatchedFree {
                step: 1,
                pointer: 0x9000
            }]
        );
        assert_eq!(engine.timeline_diagnostics().len(), 1);
    }

    #[test]
    fn test_double_allocation_overwrites() {
        let engine = ReplayEngine::new(vec![alloc(16, 0x40), alloc(32, 0x40)], ReplayConfig::default());
        let state = engine.compute_state(2).unwrap();
        assert_eq!(state.pages, vec![32]);
        assert_eq!(state.live.len(), 1);
        assert!(matches!(
            state.diagnostics[0],
            ReplayDiagnostic::DoubleAllocation {
                step: 1,
                previous_size: 16,
                size: 32,
                ..
            }
        ));
    }

    #[test]
    fn test_diagnostics_only_before_step() {
        let engine = ReplayEngine::new(vec![free(0x10), free(0x20), alloc(8, 0)], ReplayConfig::default());
        assert!(engine.compute_state(0).unwrap().diagnostics.is_empty());
        assert_eq!(engine.compute_state(1).unwrap().diagnostics.len(), 1);
        assert_eq!(engine.compute_state(3).unwrap().diagnostics.len(), 2);
    }

    #[test]
    fn test_max_diagnostics_cap() {
        let config = ReplayConfig {
            max_diagnostics: 1,
            ..Default::default()
        };
        let engine = ReplayEngine::new(vec![free(0x10), free(0x20), free(0x30)], config);
        let state = engine.compute_state(3).unwrap();
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(state.diagnostics_total, 3);
    }

    #[test]
    fn test_pending_touched_free_is_exact() {
        let engine = ReplayEngine::new(vec![alloc(8192, 0x1000), free(0x1000)], ReplayConfig::default());
        let state = engine.compute_state(1).unwrap();
        assert_eq!(state.pending_touched, BTreeSet::from([0, 1]));
        assert_eq!(engine.tracker().touched_pages(1), BTreeSet::from([0]));
    }

    #[test]
    fn test_compute_state_is_pure() {
        let engine = ReplayEngine::new(vec![alloc(10, 0), alloc(20, 0x3000), free(0)], ReplayConfig::default());
        let a = engine.compute_state(3).unwrap();
        let b = engine.compute_state(3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_snapshots_match_scratch() {
        let events = vec![
            alloc(100, 0x1000),
            alloc(5000, 0x2f00),
            free(0x1000),
            free(0x7777),
            alloc(64, 0x1000),
            alloc(64, 0x1000),
            free(0x2f00),
        ];
        let scratch = ReplayEngine::new(events.clone(), ReplayConfig::default());
        let snap = ReplayEngine::new(
            events,
            ReplayConfig {
                snapshot_interval: 2,
                ..Default::default()
            },
        );
        for step in 0..=scratch.event_count() {
            assert_eq!(scratch.compute_state(step).unwrap(), snap.compute_state(step).unwrap());
        }
    }

    fn arb_events() -> impl Strategy<Value = Vec<Event>> {
        let pointer = (0u64..64).prop_map(|slot| slot * 0x600);
        let event = prop_oneof![
            (1u64..10_000, pointer.clone()).prop_map(|(size, pointer)| Event::Allocation { size, pointer }),
            pointer.prop_map(|pointer| Event::Free { pointer }),
        ];
        proptest::collection::vec(event, 0..64)
    }

    proptest! {
        #[test]
        fn prop_page_sum_equals_live_sum(events in arb_events()) {
            let engine = ReplayEngine::new(events, ReplayConfig::default());
            for step in 0..=engine.event_count() {
                let state = engine.compute_state(step).unwrap();
                prop_assert_eq!(state.occupied_bytes(), state.live.total_bytes());
                prop_assert_eq!(state.pages.len(), engine.page_count());
            }
        }

        #[test]
        fn prop_snapshot_equivalence(events in arb_events(), interval in 1usize..8) {
            let scratch = ReplayEngine::new(events.clone(), ReplayConfig::default());
            let snap = ReplayEngine::new(events, ReplayConfig { snapshot_interval: interval, ..Default::default() });
            for step in 0..=scratch.event_count() {
                prop_assert_eq!(scratch.compute_state(step).unwrap(), snap.compute_state(step).unwrap());
            }
        }
    }
}
