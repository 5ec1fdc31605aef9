//! # Queue Error Types
//!
//! Recoverable failures of the queue. Contract violations (a flush started
//! while another is running, disabling accumulation that was never enabled)
//! are not represented here: they panic.

use thiserror::Error;

/// Errors that can occur when scheduling deferred work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The shared arena cannot hold the record (or a merged staging block).
    #[error(
        "message queue out of memory: need {needed} bytes, {used}/{capacity} used; \
         try increasing max_size_kb"
    )]
    OutOfCapacity {
        /// Bytes requested.
        needed: usize,
        /// Bytes in use when the request was made.
        used: usize,
        /// Arena capacity in bytes.
        capacity: usize,
    },

    /// A caller-supplied argument was rejected; nothing was written.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A process-wide queue is already installed.
    #[error("a message queue singleton already exists")]
    AlreadyInitialized,
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_capacity_message() {
        let err = QueueError::OutOfCapacity { needed: 64, used: 1000, capacity: 1024 };
        let msg = err.to_string();
        assert!(msg.contains("need 64 bytes"));
        assert!(msg.contains("1000/1024"));
    }
}
