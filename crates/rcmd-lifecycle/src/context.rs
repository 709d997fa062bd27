//! The single explicit value holding all daemon-wide state (§9's
//! re-architecture note: no global mutable statics).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rcmd_descriptor::ClientDescriptor;
use rcmd_pool::RunnerPool;
use rcmd_queue::{QueueResult, SharedQueue};

/// A sentinel pid used only to wake the accept loop's blocking `pop()`
/// during shutdown; no real client ever has this pid. The accept loop
/// discards any descriptor with this pid instead of admitting it.
pub const SHUTDOWN_SENTINEL_PID: i32 = 0;

/// Threaded through the accept loop and implicitly through every worker
/// thread the pool spawns (via `Arc<RunnerPool>`). Shutdown reads from
/// this same value rather than from mutable globals.
pub struct DaemonContext {
    pub queue: SharedQueue,
    pub pool: Arc<RunnerPool>,
    shutdown: Arc<AtomicBool>,
}

impl DaemonContext {
    pub fn new(queue: SharedQueue, pool: RunnerPool) -> Self {
        Self {
            queue,
            pool: Arc::new(pool),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Unblock a consumer parked in `queue.pop()` by pushing a sentinel
    /// descriptor. Destroying the queue's semaphores while a thread is
    /// blocked on them is undefined behavior (§4.A); this — not a raw
    /// `sem_destroy` race — is how the accept loop's own blocking read
    /// gets released before teardown proceeds.
    pub fn unblock_accept_loop(&self) -> QueueResult<()> {
        let sentinel = ClientDescriptor::new(SHUTDOWN_SENTINEL_PID, "/")
            .expect("sentinel descriptor is always constructible");
        self.queue.push(sentinel)
    }

    /// Consume the context once every thread sharing it has finished,
    /// handing the queue back to the caller for `destroy()`.
    pub fn into_queue(self) -> SharedQueue {
        self.queue
    }
}
