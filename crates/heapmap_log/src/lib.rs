//! HEAPMAP Event Log
//!
//! Fixed-width binary records written by an instrumented allocator.
//! Decoding turns them into an ordered event sequence plus checkpoint
//! positions; the checkpoint list drives coarse navigation over steps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cursor;
pub mod encoding;
pub mod event;
pub mod source;

pub use checkpoint::CheckpointList;
pub use cursor::{Cursor, Direction, at_percent, shift_by};
pub use encoding::{
    DecodeDiagnostic, DecodedLog, LogWriter, MAX_ALLOCATION_SIZE, RECORD_SIZE, Record, SkipReason,
    allocation_fits, decode,
};
pub use event::{Event, EventTag};
pub use source::{FileSource, LogSource, MemorySource, SourceError};
