//! Error types for accelerator operations

use std::fmt;

/// Result type for accelerator operations
pub type Result<T> = std::result::Result<T, AccelError>;

/// Coarse classification of an [`AccelError`].
///
/// Configuration errors are detected before any backend call and are
/// recoverable by adjusting parameters. Runtime faults surface through the
/// task's event or queue and leave the queue non-retryable. Exhaustion is
/// fatal to the requesting operation but not to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    RuntimeExecution,
    ResourceExhaustion,
}

/// Errors that can occur while building or running accelerator tasks
#[derive(Debug, thiserror::Error)]
pub enum AccelError {
    /// Work division exceeds the accelerator's limits
    #[error("invalid work division: {0}")]
    InvalidWorkDiv(String),

    /// Two extents that must agree do not
    #[error("extent mismatch: expected {expected}, got {actual}")]
    ExtentMismatch { expected: String, actual: String },

    /// A requested region does not fit inside its parent
    #[error("extent out of bounds: {extent} does not fit within {bounds}")]
    ExtentOutOfBounds { extent: String, bounds: String },

    /// Copy source and destination windows overlap within one allocation
    #[error("copy windows overlap within the same allocation")]
    CopyOverlap,

    /// Pitched allocation with a row pitch below the natural row size
    #[error("pitch too small: {pitch} bytes, minimum {min} bytes")]
    PitchTooSmall { pitch: usize, min: usize },

    /// Shared-memory request exceeds the device budget
    #[error("shared memory over budget: requested {requested} bytes, available {available} bytes")]
    SharedMemOverBudget { requested: usize, available: usize },

    /// Backend-reported failure while a task was running
    #[error("execution fault: {0}")]
    ExecutionFault(String),

    /// A previous task on this queue failed; the queue must be recreated
    #[error("queue poisoned by an earlier execution fault")]
    QueuePoisoned,

    /// The queue worker thread is gone
    #[error("queue worker lost")]
    WorkerLost,

    /// Memory or thread allocation failed
    #[error("allocation failed: {what} ({bytes} bytes)")]
    AllocationFailed { what: String, bytes: usize },

    /// Device enumeration or capability query failed
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Operation not supported by this backend or build
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl AccelError {
    /// Create an invalid work division error
    pub fn invalid_workdiv(msg: impl Into<String>) -> Self {
        Self::InvalidWorkDiv(msg.into())
    }

    /// Create an extent mismatch error
    pub fn extent_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::ExtentMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an extent out of bounds error
    pub fn out_of_bounds(extent: impl fmt::Display, bounds: impl fmt::Display) -> Self {
        Self::ExtentOutOfBounds {
            extent: extent.to_string(),
            bounds: bounds.to_string(),
        }
    }

    /// Create an execution fault
    pub fn execution_fault(msg: impl Into<String>) -> Self {
        Self::ExecutionFault(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Classify this error into the three-way taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidWorkDiv(_)
            | Self::ExtentMismatch { .. }
            | Self::ExtentOutOfBounds { .. }
            | Self::CopyOverlap
            | Self::PitchTooSmall { .. }
            | Self::SharedMemOverBudget { .. } => ErrorKind::Configuration,
            Self::ExecutionFault(_) | Self::QueuePoisoned | Self::WorkerLost => ErrorKind::RuntimeExecution,
            Self::AllocationFailed { .. } | Self::DeviceUnavailable(_) | Self::Unsupported(_) => {
                ErrorKind::ResourceExhaustion
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AccelError::invalid_workdiv("too wide").kind(), ErrorKind::Configuration);
        assert_eq!(
            AccelError::SharedMemOverBudget {
                requested: 1,
                available: 0
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(AccelError::CopyOverlap.kind(), ErrorKind::Configuration);
        assert_eq!(AccelError::QueuePoisoned.kind(), ErrorKind::RuntimeExecution);
        assert_eq!(
            AccelError::AllocationFailed {
                what: "buffer".into(),
                bytes: 64
            }
            .kind(),
            ErrorKind::ResourceExhaustion
        );
    }

    #[test]
    fn test_error_display() {
        let err = AccelError::extent_mismatch("(2, 2)", "(3, 3)");
        assert_eq!(err.to_string(), "extent mismatch: expected (2, 2), got (3, 3)");

        let err = AccelError::SharedMemOverBudget {
            requested: 65536,
            available: 49152,
        };
        assert!(err.to_string().contains("65536"));
        assert!(err.to_string().contains("49152"));
    }
}
