//! Cursor for navigating the step axis.

use crate::checkpoint::CheckpointList;

/// Move `step` by `delta` events, clamped to `[0, event_count]`
#[must_use]
pub fn shift_by(step: usize, delta: i64, event_count: usize) -> usize {
    let target = if delta >= 0 {
        step.saturating_add(usize::try_from(delta).unwrap_or(usize::MAX))
    } else {
        step.saturating_sub(usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX))
    };
    target.min(event_count)
}

/// Step at `percent` of the timeline, rounded to the nearest event
#[must_use]
pub fn at_percent(percent: f64, event_count: usize) -> usize {
    let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
    let step = (event_count as f64 * percent / 100.0).round() as usize;
    step.min(event_count)
}

/// Cursor position on the step axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Current step, in `[0, event_count]`
    pub position: usize,
    /// Direction of the last move
    pub direction: Direction,
    event_count: usize,
}

/// Direction of the last cursor movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the end of the log
    Forward,
    /// Toward step 0
    Backward,
}

impl Cursor {
    /// Cursor at step 0 of a log with `event_count` events
    #[must_use]
    pub fn new(event_count: usize) -> Self {
        Self {
            position: 0,
            direction: Direction::Forward,
            event_count,
        }
    }

    /// Jump to `step`, clamped to the end of the timeline
    pub fn seek(&mut self, step: usize) -> usize {
        let step = step.min(self.event_count);
        self.moved_to(step)
    }

    /// Move by `delta` events
    pub fn shift(&mut self, delta: i64) -> usize {
        let step = shift_by(self.position, delta, self.event_count);
        self.moved_to(step)
    }

    /// Move to the next checkpoint, or stay at the end
    pub fn next_checkpoint(&mut self, checkpoints: &CheckpointList) -> usize {
        let step = checkpoints.next(self.position).min(self.event_count);
        self.moved_to(step)
    }

    /// Move to the previous checkpoint, or stay at step 0
    pub fn previous_checkpoint(&mut self, checkpoints: &CheckpointList) -> usize {
        let step = checkpoints.previous(self.position);
        self.moved_to(step)
    }

    /// Move to `percent` of the timeline
    pub fn jump_percent(&mut self, percent: f64) -> usize {
        let step = at_percent(percent, self.event_count);
        self.moved_to(step)
    }

    /// Current step
    #[must_use]
    pub const fn pos(&self) -> usize {
        self.position
    }

    fn moved_to(&mut self, step: usize) -> usize {
        if step < self.position {
            self.direction = Direction::Backward;
        } else if step > self.position {
            self.direction = Direction::Forward;
        }
        self.position = step;
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_by_clamps() {
        assert_eq!(shift_by(5, 3, 10), 8);
        assert_eq!(shift_by(5, 30, 10), 10);
        assert_eq!(shift_by(5, -3, 10), 2);
        assert_eq!(shift_by(5, -30, 10), 0);
        assert_eq!(shift_by(0, i64::MIN, 10), 0);
        assert_eq!(shift_by(10, i64::MAX, 10), 10);
    }

    #[test]
    fn test_at_percent() {
        assert_eq!(at_percent(0.0, 200), 0);
        assert_eq!(at_percent(50.0, 200), 100);
        assert_eq!(at_percent(100.0, 200), 200);
        assert_eq!(at_percent(150.0, 200), 200);
        assert_eq!(at_percent(-5.0, 200), 0);
        assert_eq!(at_percent(f64::NAN, 200), 0);
        assert_eq!(at_percent(33.3, 10), 3);
    }

    #[test]
    fn test_cursor_new() {
        let cursor = Cursor::new(10);
        assert_eq!(cursor.pos(), 0);
        assert_eq!(cursor.direction, Direction::Forward);
    }

    #[test]
    fn test_cursor_seek_clamps() {
        let mut cursor = Cursor::new(10);
        assert_eq!(cursor.seek(42), 10);
        assert_eq!(cursor.pos(), 10);
    }

    #[test]
    fn test_cursor_shift() {
        let mut cursor = Cursor::new(10);
        cursor.seek(5);
        assert_eq!(cursor.shift(-2), 3);
        assert_eq!(cursor.direction, Direction::Backward);
        assert_eq!(cursor.shift(100), 10);
        assert_eq!(cursor.direction, Direction::Forward);
    }

    #[test]
    fn test_cursor_checkpoints() {
        let checkpoints = CheckpointList::from_markers([3, 6], 9);
        let mut cursor = Cursor::new(9);
        assert_eq!(cursor.next_checkpoint(&checkpoints), 3);
        assert_eq!(cursor.next_checkpoint(&checkpoints), 6);
        assert_eq!(cursor.next_checkpoint(&checkpoints), 9);
        assert_eq!(cursor.next_checkpoint(&checkpoints), 9);
        assert_eq!(cursor.previous_checkpoint(&checkpoints), 6);
        assert_eq!(cursor.direction, Direction::Backward);
    }

    #[test]
    fn test_cursor_previous_at_start() {
        let checkpoints = CheckpointList::from_markers([3], 9);
        let mut cursor = Cursor::new(9);
        assert_eq!(cursor.previous_checkpoint(&checkpoints), 0);
    }

    #[test]
    fn test_cursor_jump_percent() {
        let mut cursor = Cursor::new(10);
        cursor.seek(7);
        assert_eq!(cursor.jump_percent(20.0), 2);
        assert_eq!(cursor.pos(), 2);
        assert_eq!(cursor.direction, Direction::Backward);
    }
}
