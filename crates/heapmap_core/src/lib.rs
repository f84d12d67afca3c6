//! HEAPMAP Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Page geometry shared by the page mapper, the replay engine and the
//! touched-page tracker, plus the error taxonomy used across the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod page;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use page::{PAGE_SHIFT, PAGE_SIZE, PageChunk, PageChunks, PageSpan, page_of};
