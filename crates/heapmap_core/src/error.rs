//! Core error types for HEAPMAP.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Every variant is fatal for the operation that returned it. Recoverable
/// problems (unknown record tags, double allocations, unmatched frees) are
/// reported as diagnostics next to the result instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The log buffer is structurally unusable
    #[error("Malformed log: {reason}")]
    MalformedLog {
        /// What was wrong with the buffer
        reason: String,
    },

    /// The log could not be fetched
    #[error("Log unavailable from {origin}: {reason}")]
    LogUnavailable {
        /// Path or name of the log that failed to load
        origin: String,
        /// Underlying failure
        reason: String,
    },

    /// A page was referenced that the page map does not contain
    #[error("Invalid page 0x{page:X}: not present in the page map")]
    InvalidPage {
        /// Page number (address >> 12)
        page: u64,
    },

    /// A step outside `[0, event_count]` was requested
    #[error("Step {step} out of range (event count {event_count})")]
    StepOutOfRange {
        /// Requested step
        step: usize,
        /// Number of events in the log
        event_count: usize,
    },
}

impl CoreError {
    /// Build a `MalformedLog` error
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedLog {
            reason: reason.into(),
        }
    }

    /// Whether the error ends the session (nothing left to render)
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::MalformedLog { .. } | Self::LogUnavailable { .. })
    }
}
