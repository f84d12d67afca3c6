//! Event types for the heap log.

use heapmap_core::PageSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire tag of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTag {
    /// `field1` = size, `field2` = pointer
    Allocation,
    /// `field2` = pointer
    Free,
    /// Timeline marker, no payload
    Checkpoint,
}

impl EventTag {
    /// Parse a wire code
    #[must_use]
    pub const fn from_wire(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Allocation),
            2 => Some(Self::Free),
            3 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Wire code of the tag
    #[must_use]
    pub const fn as_wire(self) -> u64 {
        match self {
            Self::Allocation => 1,
            Self::Free => 2,
            Self::Checkpoint => 3,
        }
    }
}

/// A replayable heap event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// `size` bytes handed out at `pointer`
    Allocation {
        /// Requested size in bytes
        size: u64,
        /// Start address
        pointer: u64,
    },
    /// Allocation at `pointer` released
    Free {
        /// Start address of the released allocation
        pointer: u64,
    },
}

impl Event {
    /// Address the event refers to
    #[must_use]
    pub const fn pointer(&self) -> u64 {
        match self {
            Self::Allocation { pointer, .. } | Self::Free { pointer } => *pointer,
        }
    }

    /// True for an allocation, false for a free
    #[must_use]
    pub const fn is_allocation(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }

    /// Wire tag the event is encoded with
    #[must_use]
    pub const fn tag(&self) -> EventTag {
        match self {
            Self::Allocation { .. } => EventTag::Allocation,
            Self::Free { .. } => EventTag::Free,
        }
    }

    /// Pages spanned by an allocation, `None` for a free
    #[must_use]
    pub fn allocation_span(&self) -> Option<PageSpan> {
        match *self {
            Self::Allocation { size, pointer } => Some(PageSpan::of(pointer, size)),
            Self::Free { .. } => None,
        }
    }

    /// Human-readable description of the operation
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { size, pointer } => {
                write!(f, "allocate {} bytes at 0x{:x}", size, pointer)
            }
            Self::Free { pointer } => write!(f, "free 0x{:x}", pointer),
        }
    }
}
