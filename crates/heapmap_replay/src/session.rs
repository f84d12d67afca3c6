//! Session over one loaded heap log.
//!
//! Holds the decoded log, the replay engine and the most recently computed
//! state. Renderers and front ends keep a `Session` and ask it to move;
//! every move computes one complete new `StepState`.

use crate::engine::{ReplayConfig, ReplayEngine};
use crate::page_map::PageMap;
use crate::state::{ReplayDiagnostic, StepState};
use crate::touched::TouchedDiff;
use heapmap_core::{CoreError, CoreResult};
use heapmap_log::{CheckpointList, Cursor, DecodeDiagnostic, Event, LogSource, decode};
use std::collections::BTreeSet;

/// Engine handle for one loaded log
pub struct Session {
    engine: ReplayEngine,
    checkpoints: CheckpointList,
    decode_diagnostics: Vec<DecodeDiagnostic>,
    cursor: Cursor,
    current: StepState,
    previous_touched: BTreeSet<usize>,
}

impl Session {
    /// Decode `buffer` and position the session at step 0.
    ///
    /// # Errors
    ///
    /// Returns `MalformedLog` if the buffer cannot be decoded.
    pub fn load(buffer: &[u8], config: ReplayConfig) -> CoreResult<Self> {
        let log = decode(buffer)?;
        let engine = ReplayEngine::new(log.events, config);
        let current = engine.compute_state(0)?;
        let cursor = Cursor::new(engine.event_count());

        tracing::info!(
            events = engine.event_count(),
            pages = engine.page_count(),
            checkpoints = log.checkpoints.len(),
            skipped_records = log.diagnostics.len(),
            "heap log loaded"
        );

        Ok(Self {
            engine,
            checkpoints: log.checkpoints,
            decode_diagnostics: log.diagnostics,
            cursor,
            current,
            previous_touched: BTreeSet::new(),
        })
    }

    /// Fetch the log from `source`, then load it.
    ///
    /// # Errors
    ///
    /// Returns `LogUnavailable` if the source fails, or any error of
    /// [`Session::load`]. A failed load is not retried.
    pub async fn open(source: &dyn LogSource, config: ReplayConfig) -> CoreResult<Self> {
        let buffer = source.load().await.map_err(|err| {
            tracing::error!(source = %source.name(), error = %err, "failed to load heap log");
            CoreError::from(err)
        })?;
        Self::load(&buffer, config)
    }

    /// Number of replayable events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.engine.event_count()
    }

    /// Number of distinct pages the log touches
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.engine.page_count()
    }

    /// Decoded events in log order
    #[must_use]
    pub fn events(&self) -> &[Event] {
        self.engine.events()
    }

    /// Page number to dense index mapping
    #[must_use]
    pub fn page_map(&self) -> &PageMap {
        self.engine.page_map()
    }

    /// Checkpoint steps, sentinels included
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointList {
        &self.checkpoints
    }

    /// Records skipped while decoding
    #[must_use]
    pub fn decode_diagnostics(&self) -> &[DecodeDiagnostic] {
        &self.decode_diagnostics
    }

    /// Replay diagnostics over the whole log
    #[must_use]
    pub fn timeline_diagnostics(&self) -> &[ReplayDiagnostic] {
        self.engine.timeline_diagnostics()
    }

    /// Underlying replay engine
    #[must_use]
    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    /// State after the first `step` events, without moving the session
    ///
    /// # Errors
    ///
    /// See [`ReplayEngine::compute_state`].
    pub fn compute_state(&self, step: usize) -> CoreResult<StepState> {
        self.engine.compute_state(step)
    }

    /// Dense page indices touched by the event at `step`
    ///
    /// # Errors
    ///
    /// With `exact_free_span` enabled the live set is replayed, so the
    /// errors of [`ReplayEngine::compute_state`] apply.
    pub fn touched_pages(&self, step: usize) -> CoreResult<BTreeSet<usize>> {
        let exact = self.engine.config().exact_free_span
            && self.events().get(step).is_some_and(|event| !event.is_allocation());
        if exact {
            Ok(self.engine.compute_state(step)?.pending_touched)
        } else {
            Ok(self.engine.tracker().touched_pages(step))
        }
    }

    /// Greatest checkpoint before `step`, or 0
    #[must_use]
    pub fn previous_checkpoint(&self, step: usize) -> usize {
        self.checkpoints.previous(step)
    }

    /// Least checkpoint after `step`, or the event count
    #[must_use]
    pub fn next_checkpoint(&self, step: usize) -> usize {
        self.checkpoints.next(step).min(self.event_count())
    }

    /// `step` moved by `delta`, clamped to the log
    #[must_use]
    pub fn shift_by(&self, step: usize, delta: i64) -> usize {
        heapmap_log::shift_by(step, delta, self.event_count())
    }

    /// Most recently computed state
    #[must_use]
    pub fn current(&self) -> &StepState {
        &self.current
    }

    /// Step the session is positioned at
    #[must_use]
    pub fn step(&self) -> usize {
        self.cursor.pos()
    }

    /// Move to `step`
    ///
    /// # Errors
    ///
    /// Returns `StepOutOfRange` if `step` is past the end of the log.
    pub fn seek(&mut self, step: usize) -> CoreResult<&StepState> {
        if step > self.event_count() {
            return Err(CoreError::StepOutOfRange {
                step,
                event_count: self.event_count(),
            });
        }
        self.navigate(|cursor, _| cursor.seek(step))
    }

    /// Move to the next checkpoint
    pub fn seek_next_checkpoint(&mut self) -> CoreResult<&StepState> {
        self.navigate(|cursor, checkpoints| cursor.next_checkpoint(checkpoints))
    }

    /// Move to the previous checkpoint
    pub fn seek_previous_checkpoint(&mut self) -> CoreResult<&StepState> {
        self.navigate(|cursor, checkpoints| cursor.previous_checkpoint(checkpoints))
    }

    /// Move by `delta` events, clamped to the log
    pub fn shift(&mut self, delta: i64) -> CoreResult<&StepState> {
        self.navigate(|cursor, _| cursor.shift(delta))
    }

    /// Move to `percent` of the timeline
    pub fn jump_percent(&mut self, percent: f64) -> CoreResult<&StepState> {
        self.navigate(|cursor, _| cursor.jump_percent(percent))
    }

    /// Pages touched by the current pending event compared with the
    /// state shown before the last move
    #[must_use]
    pub fn touched_diff(&self) -> TouchedDiff {
        TouchedDiff::compute(&self.previous_touched, &self.current.pending_touched)
    }

    fn navigate<F>(&mut self, movement: F) -> CoreResult<&StepState>
    where
        F: FnOnce(&mut Cursor, &CheckpointList) -> usize,
    {
        let mut cursor = self.cursor;
        let step = movement(&mut cursor, &self.checkpoints);
        let state = self.engine.compute_state(step)?;
        tracing::trace!(step, direction = ?cursor.direction, "session moved");

        self.cursor = cursor;
        let previous = std::mem::replace(&mut self.current, state);
        self.previous_touched = previous.pending_touched;
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapmap_log::{LogWriter, MemorySource};

    fn buffer() -> Vec<u8> {
        let mut writer = LogWriter::new(Vec::new());
        writer.allocation(4096, 0).unwrap();
        writer.allocation(100, 0x3000).unwrap();
        writer.checkpoint().unwrap();
        writer.free(0).unwrap();
        writer.free(0x5000).unwrap();
        writer.checkpoint().unwrap();
        writer.allocation(8, 0x3100).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_load() {
        let session = Session::load(&buffer(), ReplayConfig::default()).unwrap();
        assert_eq!(session.event_count(), 5);
        assert_eq!(session.page_count(), 2);
        assert_eq!(session.checkpoints().as_slice(), &[0, 2, 4, 5]);
        assert_eq!(session.step(), 0);
        assert!(session.current().live.is_empty());
    }

    #[test]
    fn test_load_skips_huge_allocation() {
        let mut writer = LogWriter::new(Vec::new());
        writer.allocation(u64::MAX, 0x1000).unwrap();
        let session = Session::load(&writer.into_inner(), ReplayConfig::default()).unwrap();
        assert_eq!(session.event_count(), 0);
        assert_eq!(session.page_count(), 0);
        assert_eq!(session.decode_diagnostics().len(), 1);
        assert!(session.current().pages.is_empty());
    }

    #[test]
    fn test_load_malformed() {
        let mut data = buffer();
        data.pop();
        let err = Session::load(&data, ReplayConfig::default()).err().unwrap();
        assert!(matches!(err, CoreError::MalformedLog { .. }));
    }

    #[test]
    fn test_seek_and_navigate() {
        let mut session = Session::load(&buffer(), ReplayConfig::default()).unwrap();

        assert_eq!(session.seek_next_checkpoint().unwrap().step, 2);
        assert_eq!(session.current().pages, vec![4096, 100]);

        assert_eq!(session.seek_next_checkpoint().unwrap().step, 4);
        assert_eq!(session.current().pages, vec![0, 100]);
        assert_eq!(session.current().diagnostics.len(), 1);

        assert_eq!(session.shift(10).unwrap().step, 5);
        assert_eq!(session.seek_next_checkpoint().unwrap().step, 5);
        assert_eq!(session.seek_previous_checkpoint().unwrap().step, 4);
        assert_eq!(session.shift(-100).unwrap().step, 0);
        assert_eq!(session.seek_previous_checkpoint().unwrap().step, 0);
        assert_eq!(session.jump_percent(60.0).unwrap().step, 3);
    }

    #[test]
    fn test_seek_out_of_range_keeps_state() {
        let mut session = Session::load(&buffer(), ReplayConfig::default()).unwrap();
        session.seek(2).unwrap();
        assert!(session.seek(6).is_err());
        assert_eq!(session.step(), 2);
        assert_eq!(session.current().step, 2);
    }

    #[test]
    fn test_stateless_navigation() {
        let session = Session::load(&buffer(), ReplayConfig::default()).unwrap();
        assert_eq!(session.previous_checkpoint(0), 0);
        assert_eq!(session.next_checkpoint(5), 5);
        assert_eq!(session.next_checkpoint(2), 4);
        assert_eq!(session.shift_by(1, -3), 0);
        assert_eq!(session.shift_by(1, 3), 4);
    }

    #[test]
    fn test_touched_pages() {
        let session = Session::load(&buffer(), ReplayConfig::default()).unwrap();
        assert_eq!(session.touched_pages(0).unwrap(), BTreeSet::from([0]));
        assert_eq!(session.touched_pages(1).unwrap(), BTreeSet::from([1]));
        assert_eq!(session.touched_pages(2).unwrap(), BTreeSet::from([0]));
        assert!(session.touched_pages(3).unwrap().is_empty());
        assert!(session.touched_pages(5).unwrap().is_empty());
    }

    #[test]
    fn test_touched_exact_free_span() {
        let mut writer = LogWriter::new(Vec::new());
        writer.allocation(8192, 0x1000).unwrap();
        writer.free(0x1000).unwrap();
        let data = writer.into_inner();

        let plain = Session::load(&data, ReplayConfig::default()).unwrap();
        assert_eq!(plain.touched_pages(1).unwrap(), BTreeSet::from([0]));

        let config = ReplayConfig {
            exact_free_span: true,
            ..Default::default()
        };
        let exact = Session::load(&data, config).unwrap();
        assert_eq!(exact.touched_pages(1).unwrap(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_touched_diff() {
        let mut session = Session::load(&buffer(), ReplayConfig::default()).unwrap();
        session.seek(1).unwrap();
        let diff = session.touched_diff();
        assert_eq!(diff.left, BTreeSet::from([0]));
        assert_eq!(diff.entered, BTreeSet::from([1]));
        assert!(diff.retained.is_empty());
    }

    #[tokio::test]
    async fn test_open_from_source() {
        let source = MemorySource::new("fixture", buffer());
        let session = Session::open(&source, ReplayConfig::default()).await.unwrap();
        assert_eq!(session.event_count(), 5);
    }

    #[tokio::test]
    async fn test_open_unavailable() {
        let source = MemorySource::unavailable("missing");
        let err = Session::open(&source, ReplayConfig::default()).await.err().unwrap();
        assert!(matches!(err, CoreError::LogUnavailable { .. }));
    }
}
