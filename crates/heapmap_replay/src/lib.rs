//! HEAPMAP Replay Engine
//!
//! Deterministic reconstruction of live allocations and per-page occupancy
//! at any step of a decoded heap log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod page_map;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod touched;

pub use engine::{ReplayConfig, ReplayEngine};
pub use page_map::PageMap;
pub use session::Session;
pub use snapshot::{Snapshot, SnapshotIndex};
pub use state::{LiveSet, ReplayDiagnostic, StepState};
pub use touched::{TouchedDiff, TouchedTracker};
