//! Shared-memory layout for the queue.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ QueueHeader                                                 │
//! │  magic, capacity, head, tail                                │
//! │  mutex            (pthread_mutex_t, PTHREAD_PROCESS_SHARED) │
//! │  empty_slots      (sem_t, pshared, init = capacity)         │
//! │  full_slots       (sem_t, pshared, init = 0)                │
//! ├────────────────────────────────────────────────────────────┤
//! │ buffer: [ClientDescriptor; capacity]                        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `head`/`tail` and the buffer are mutated only while `mutex` is held;
//! `empty_slots`/`full_slots` are the sole blocking points and double as
//! the emptiness/fullness test — index comparison is never used for that.

use std::mem::size_of;

use libc::{pthread_mutex_t, sem_t};
use rcmd_descriptor::ClientDescriptor;

use crate::error::{QueueError, QueueResult};

pub(crate) const MAGIC: u32 = 0x4c4e4b52; // "RKNL" little-endian-ish tag

#[repr(C)]
pub(crate) struct QueueHeader {
    pub magic: u32,
    pub capacity: u32,
    pub head: u32,
    pub tail: u32,
    pub mutex: pthread_mutex_t,
    pub empty_slots: sem_t,
    pub full_slots: sem_t,
}

pub(crate) const HEADER_SIZE: usize = size_of::<QueueHeader>();

impl QueueHeader {
    /// Total shared-memory size needed for `capacity` descriptors.
    pub fn size_for(capacity: u32) -> usize {
        HEADER_SIZE + capacity as usize * size_of::<ClientDescriptor>()
    }

    /// Total size implied by this header's own `capacity` field. Used by a
    /// consumer or producer that only knows the segment name, not its
    /// capacity, ahead of time.
    pub fn total_size(&self) -> usize {
        Self::size_for(self.capacity)
    }

    pub fn validate(&self, expected_capacity: Option<u32>) -> QueueResult<()> {
        if self.magic != MAGIC {
            return Err(QueueError::InvalidHeader(format!(
                "bad magic {:#x}, expected {:#x}",
                self.magic, MAGIC
            )));
        }
        if let Some(expected) = expected_capacity {
            if self.capacity != expected {
                return Err(QueueError::InvalidHeader(format!(
                    "capacity mismatch: segment has {}, caller asked for {}",
                    self.capacity, expected
                )));
            }
        }
        Ok(())
    }

    /// Initialize a freshly-mapped, zeroed header in place: indices,
    /// process-shared mutex, and the two counting semaphores.
    ///
    /// # Safety
    /// `self` must point at a `HEADER_SIZE`-byte region that is writable
    /// and not concurrently accessed by another thread or process yet.
    pub unsafe fn init(&mut self, capacity: u32) -> QueueResult<()> {
        self.magic = MAGIC;
        self.capacity = capacity;
        self.head = 0;
        self.tail = 0;

        let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        if libc::pthread_mutexattr_init(&mut attr) != 0 {
            return Err(QueueError::Sync("pthread_mutexattr_init failed".into()));
        }
        if libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED) != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(QueueError::Sync("pthread_mutexattr_setpshared failed".into()));
        }
        let rc = libc::pthread_mutex_init(&mut self.mutex, &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        if rc != 0 {
            return Err(QueueError::Sync(format!("pthread_mutex_init failed: {rc}")));
        }

        if libc::sem_init(&mut self.empty_slots, 1, capacity) != 0 {
            return Err(QueueError::Sync(format!(
                "sem_init(empty_slots) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        if libc::sem_init(&mut self.full_slots, 1, 0) != 0 {
            return Err(QueueError::Sync(format!(
                "sem_init(full_slots) failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        Ok(())
    }

    /// Destroy the mutex and semaphores. Consumer-only, called right
    /// before the segment is unlinked.
    ///
    /// # Safety
    /// No producer may be blocked inside `push` when this is called.
    pub unsafe fn teardown(&mut self) {
        libc::pthread_mutex_destroy(&mut self.mutex);
        libc::sem_destroy(&mut self.empty_slots);
        libc::sem_destroy(&mut self.full_slots);
    }
}
