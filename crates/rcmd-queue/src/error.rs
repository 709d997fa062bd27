//! Error types for the shared-memory queue.

use thiserror::Error;

/// Errors that can occur while creating, attaching to, or operating on a
/// [`crate::SharedQueue`].
#[derive(Error, Debug)]
pub enum QueueError {
    /// `open_consumer` was called but the segment already exists.
    #[error("shared memory segment '{0}' already exists")]
    AlreadyExists(String),

    /// `open_producer` was called but the segment does not exist.
    #[error("shared memory segment '{0}' does not exist")]
    NotFound(String),

    /// `shm_open`/`ftruncate` failed.
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// `mmap`/`munmap` failed.
    #[error("memory mapping error: {0}")]
    Mmap(String),

    /// The mapped segment's header failed validation (bad magic, or a
    /// capacity mismatch against what the caller requested).
    #[error("invalid queue header: {0}")]
    InvalidHeader(String),

    /// A `pthread_mutex_*` or `sem_*` call failed for a reason other than
    /// `EINTR` (which is retried transparently and never surfaced).
    #[error("synchronization primitive error: {0}")]
    Sync(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
