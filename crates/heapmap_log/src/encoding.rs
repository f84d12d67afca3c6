//! Binary record codec.
//!
//! A log is a sequence of fixed 24-byte records, each three little-endian
//! `u64` fields `(tag, field1, field2)`. There is no header and no padding.

use crate::checkpoint::CheckpointList;
use crate::event::{Event, EventTag};
use heapmap_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// Width of one record in bytes
pub const RECORD_SIZE: usize = 3 * 8;

/// Largest allocation size the decoder accepts (64 GiB)
pub const MAX_ALLOCATION_SIZE: u64 = 1 << 36;

/// One raw wire record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Wire tag
    pub tag: u64,
    /// Size for allocations, unused otherwise
    pub field1: u64,
    /// Pointer for allocations and frees, unused for checkpoints
    pub field2: u64,
}

impl Record {
    /// Decode one record from its wire bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let word = |offset: usize| {
            let mut field = [0u8; 8];
            field.copy_from_slice(&bytes[offset..offset + 8]);
            u64::from_le_bytes(field)
        };
        Self {
            tag: word(0),
            field1: word(8),
            field2: word(16),
        }
    }

    /// Encode to wire bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..16].copy_from_slice(&self.field1.to_le_bytes());
        out[16..24].copy_from_slice(&self.field2.to_le_bytes());
        out
    }

    /// Wire record for an event
    #[must_use]
    pub const fn from_event(event: &Event) -> Self {
        let tag = event.tag().as_wire();
        match *event {
            Event::Allocation { size, pointer } => Self {
                tag,
                field1: size,
                field2: pointer,
            },
            Event::Free { pointer } => Self {
                tag,
                field1: 0,
                field2: pointer,
            },
        }
    }

    /// Checkpoint marker record
    #[must_use]
    pub const fn checkpoint() -> Self {
        Self {
            tag: EventTag::Checkpoint.as_wire(),
            field1: 0,
            field2: 0,
        }
    }
}

/// Whether an allocation of `size` bytes at `pointer` can be replayed.
///
/// The block must end inside the 64-bit address space and be no larger
/// than [`MAX_ALLOCATION_SIZE`].
#[must_use]
pub fn allocation_fits(size: u64, pointer: u64) -> bool {
    size <= MAX_ALLOCATION_SIZE && u128::from(pointer) + u128::from(size) <= 1u128 << 64
}

/// Why a record was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Tag is not one of the known wire codes
    UnknownTag {
        /// The unrecognized tag value
        tag: u64,
    },
    /// Allocation too large or running past the end of the address space
    OversizedAllocation {
        /// Requested size in bytes
        size: u64,
        /// Start address
        pointer: u64,
    },
}

/// A record that was skipped during decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeDiagnostic {
    /// Index of the record in the buffer
    pub record: usize,
    /// What was wrong with it
    pub reason: SkipReason,
}

impl fmt::Display for DecodeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            SkipReason::UnknownTag { tag } => {
                write!(f, "record {}: unknown event tag {}, skipped", self.record, tag)
            }
            SkipReason::OversizedAllocation { size, pointer } => write!(
                f,
                "record {}: allocation of {} bytes at 0x{:x} does not fit the address space, skipped",
                self.record, size, pointer
            ),
        }
    }
}

/// Result of decoding a log buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedLog {
    /// Allocation and free events in log order
    pub events: Vec<Event>,
    /// Checkpoint steps with sentinels
    pub checkpoints: CheckpointList,
    /// Records that were skipped
    pub diagnostics: Vec<DecodeDiagnostic>,
}

impl DecodedLog {
    /// Number of allocation and free events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Decode a raw log buffer.
///
/// # Errors
///
/// Returns `MalformedLog` if the buffer length is not a multiple of
/// `RECORD_SIZE`. Records with an unknown tag, and allocations that fail
/// [`allocation_fits`], are skipped and reported in
/// `DecodedLog::diagnostics`.
pub fn decode(buffer: &[u8]) -> CoreResult<DecodedLog> {
    if buffer.len() % RECORD_SIZE != 0 {
        return Err(CoreError::malformed(format!(
            "buffer length {} is not a multiple of {}",
            buffer.len(),
            RECORD_SIZE
        )));
    }

    let mut events = Vec::with_capacity(buffer.len() / RECORD_SIZE);
    let mut markers = Vec::new();
    let mut diagnostics = Vec::new();

    let mut rest = buffer;
    let records = std::iter::from_fn(move || {
        let (bytes, tail) = rest.split_first_chunk::<RECORD_SIZE>()?;
        rest = tail;
        Some(Record::from_bytes(bytes))
    });

    for (index, record) in records.enumerate() {
        let skipped = match EventTag::from_wire(record.tag) {
            Some(EventTag::Allocation) => {
                let (size, pointer) = (record.field1, record.field2);
                if allocation_fits(size, pointer) {
                    events.push(Event::Allocation { size, pointer });
                    None
                } else {
                    Some(SkipReason::OversizedAllocation { size, pointer })
                }
            }
            Some(EventTag::Free) => {
                events.push(Event::Free {
                    pointer: record.field2,
                });
                None
            }
            Some(EventTag::Checkpoint) => {
                markers.push(events.len());
                None
            }
            None => Some(SkipReason::UnknownTag { tag: record.tag }),
        };

        if let Some(reason) = skipped {
            let diagnostic = DecodeDiagnostic {
                record: index,
                reason,
            };
            tracing::warn!(%diagnostic, "skipping record");
            diagnostics.push(diagnostic);
        }
    }

    let checkpoints = CheckpointList::from_markers(markers, events.len());

    tracing::debug!(
        events = events.len(),
        checkpoints = checkpoints.len(),
        skipped = diagnostics.len(),
        "decoded heap log"
    );

    Ok(DecodedLog {
        events,
        checkpoints,
        diagnostics,
    })
}

/// Writer producing the wire format
pub struct LogWriter<W> {
    writer: W,
    records: usize,
}

impl<W: Write> LogWriter<W> {
    /// Create a new writer
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Write a raw record
    pub fn record(&mut self, record: Record) -> io::Result<()> {
        self.writer.write_all(&record.to_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Write an event
    pub fn event(&mut self, event: &Event) -> io::Result<()> {
        self.record(Record::from_event(event))
    }

    /// Write an allocation of `size` bytes at `pointer`
    pub fn allocation(&mut self, size: u64, pointer: u64) -> io::Result<()> {
        self.event(&Event::Allocation { size, pointer })
    }

    /// Write a free of `pointer`
    pub fn free(&mut self, pointer: u64) -> io::Result<()> {
        self.event(&Event::Free { pointer })
    }

    /// Write a checkpoint marker
    pub fn checkpoint(&mut self) -> io::Result<()> {
        self.record(Record::checkpoint())
    }

    /// Records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Flush the writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume and return the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}
