//! The shared "Linker" queue: a bounded, blocking FIFO of [`ClientDescriptor`]
//! values living in POSIX shared memory, safe for many concurrent producers
//! (one per connecting client) and a single consumer (the daemon's accept
//! loop).
//!
//! Emptiness/fullness is never decided by comparing `head`/`tail`; the two
//! counting semaphores are the sole source of truth, which keeps the
//! classical bounded producer-consumer proof valid under concurrent
//! producers. `head`/`tail` and the buffer are mutated only while the
//! process-shared mutex is held.

mod error;
mod header;
mod shm;

pub use error::{QueueError, QueueResult};

use std::mem::size_of;
use std::os::raw::c_int;

use libc::EINTR;
use rcmd_descriptor::ClientDescriptor;
use tracing::{debug, warn};

use header::{QueueHeader, HEADER_SIZE};

/// A handle to the shared queue, usable for both pushing and popping.
///
/// The spec distinguishes a *producer* role (attaches to an existing
/// segment) from the *consumer* role (creates the segment and is the only
/// one allowed to call [`SharedQueue::destroy`]); both roles share the same
/// push/pop implementation once attached.
pub struct SharedQueue {
    ptr: *mut u8,
    fd: c_int,
    size: usize,
    name: String,
    capacity: u32,
    is_owner: bool,
}

// SAFETY: all mutable state is guarded either by the process-shared mutex
// or by the counting semaphores; the struct itself holds no thread-local
// state, so it is sound to move or share a handle across threads.
unsafe impl Send for SharedQueue {}
unsafe impl Sync for SharedQueue {}

impl SharedQueue {
    /// Attach to an existing shared segment by name. Fails if the segment
    /// is missing. Used by clients pushing requests.
    pub fn open_producer(name: &str) -> QueueResult<Self> {
        let total_size = shm::peek_header_size(name, HEADER_SIZE)?;
        let (ptr, fd) = shm::open_shm(name, total_size)?;

        let header = unsafe { &*(ptr as *const QueueHeader) };
        if let Err(e) = header.validate(None) {
            unsafe { shm::close_shm(ptr, total_size, fd) };
            return Err(e);
        }
        let capacity = header.capacity;

        debug!(name, capacity, "attached to queue as producer");
        Ok(Self {
            ptr,
            fd,
            size: total_size,
            name: name.to_string(),
            capacity,
            is_owner: false,
        })
    }

    /// Create the segment exclusively (fails if already present), sized to
    /// hold `capacity` descriptors, and initialize all semaphores and
    /// indices. Used by the daemon's accept loop.
    pub fn open_consumer(name: &str, capacity: u32) -> QueueResult<Self> {
        let total_size = QueueHeader::size_for(capacity);
        let (ptr, fd) = shm::create_shm(name, total_size)?;

        let header = unsafe { &mut *(ptr as *mut QueueHeader) };
        if let Err(e) = unsafe { header.init(capacity) } {
            unsafe { shm::close_shm(ptr, total_size, fd) };
            let _ = shm::unlink_shm(name);
            return Err(e);
        }

        debug!(name, capacity, "created queue as consumer");
        Ok(Self {
            ptr,
            fd,
            size: total_size,
            name: name.to_string(),
            capacity,
            is_owner: true,
        })
    }

    /// Fixed capacity of this queue.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn header(&self) -> &QueueHeader {
        unsafe { &*(self.ptr as *const QueueHeader) }
    }

    #[allow(clippy::mut_from_ref)]
    fn header_mut(&self) -> &mut QueueHeader {
        unsafe { &mut *(self.ptr as *mut QueueHeader) }
    }

    fn buffer_ptr(&self) -> *mut ClientDescriptor {
        unsafe { self.ptr.add(HEADER_SIZE) as *mut ClientDescriptor }
    }

    unsafe fn slot(&self, index: u32) -> *mut ClientDescriptor {
        self.buffer_ptr().add(index as usize)
    }

    /// Blocking bounded producer push: waits for a free slot, copies `desc`
    /// into the buffer, advances `head`, and wakes one blocked consumer.
    pub fn push(&self, desc: ClientDescriptor) -> QueueResult<()> {
        let header = self.header_mut();
        sem_wait(&mut header.empty_slots)?;
        mutex_lock(&mut header.mutex)?;

        let index = header.head;
        unsafe { std::ptr::write(self.slot(index), desc) };
        header.head = (index + 1) % self.capacity;

        mutex_unlock(&mut header.mutex)?;
        sem_post(&mut header.full_slots)?;
        Ok(())
    }

    /// Blocking bounded consumer pop: waits for an available entry, reads
    /// it from the buffer, advances `tail`, and wakes one blocked producer.
    pub fn pop(&self) -> QueueResult<ClientDescriptor> {
        let header = self.header_mut();
        sem_wait(&mut header.full_slots)?;
        mutex_lock(&mut header.mutex)?;

        let index = header.tail;
        let desc = unsafe { std::ptr::read(self.slot(index)) };
        header.tail = (index + 1) % self.capacity;

        mutex_unlock(&mut header.mutex)?;
        sem_post(&mut header.empty_slots)?;
        Ok(desc)
    }

    /// Consumer-only: destroy the semaphores and unlink the shared segment.
    ///
    /// Calling this while a producer is blocked in [`push`](Self::push) is
    /// undefined behavior by the spec's own contract; callers must ensure
    /// every producer has either returned or been signalled first (the
    /// daemon does this by cancelling every worker, which closes the FIFOs
    /// a blocked client is waiting on, before calling `destroy`).
    pub fn destroy(self) -> QueueResult<()> {
        if !self.is_owner {
            warn!(name = %self.name, "destroy() called on a producer handle; only the consumer should own teardown");
        }
        unsafe { self.header_mut().teardown() };
        unsafe { shm::close_shm(self.ptr, self.size, self.fd) };
        shm::unlink_shm(&self.name)?;
        // Prevent Drop from double-closing; we consumed self above but
        // still need to skip the destructor's munmap/close.
        std::mem::forget(self);
        Ok(())
    }
}

impl Drop for SharedQueue {
    fn drop(&mut self) {
        unsafe { shm::close_shm(self.ptr, self.size, self.fd) };
    }
}

fn sem_wait(sem: &mut libc::sem_t) -> QueueResult<()> {
    loop {
        let rc = unsafe { libc::sem_wait(sem) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(EINTR) {
            continue;
        }
        return Err(QueueError::Sync(format!("sem_wait failed: {err}")));
    }
}

fn sem_post(sem: &mut libc::sem_t) -> QueueResult<()> {
    if unsafe { libc::sem_post(sem) } != 0 {
        return Err(QueueError::Sync(format!(
            "sem_post failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn mutex_lock(mutex: &mut libc::pthread_mutex_t) -> QueueResult<()> {
    let rc = unsafe { libc::pthread_mutex_lock(mutex) };
    if rc != 0 {
        return Err(QueueError::Sync(format!("pthread_mutex_lock failed: {rc}")));
    }
    Ok(())
}

fn mutex_unlock(mutex: &mut libc::pthread_mutex_t) -> QueueResult<()> {
    let rc = unsafe { libc::pthread_mutex_unlock(mutex) };
    if rc != 0 {
        return Err(QueueError::Sync(format!("pthread_mutex_unlock failed: {rc}")));
    }
    Ok(())
}

const _: () = assert!(size_of::<ClientDescriptor>() > 0);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        format!(
            "/rcmd_test_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn consumer_create_then_producer_attach_round_trips() {
        let name = unique_name("roundtrip");
        let consumer = SharedQueue::open_consumer(&name, 4).unwrap();
        let producer = SharedQueue::open_producer(&name).unwrap();

        let desc = ClientDescriptor::new(123, "/tmp").unwrap();
        producer.push(desc).unwrap();
        let popped = consumer.pop().unwrap();
        assert_eq!(popped.pid, 123);

        consumer.destroy().unwrap();
    }

    #[test]
    fn second_consumer_create_fails_with_already_exists() {
        let name = unique_name("dup");
        let first = SharedQueue::open_consumer(&name, 2).unwrap();
        let second = SharedQueue::open_consumer(&name, 2);
        assert!(matches!(second, Err(QueueError::AlreadyExists(_))));
        first.destroy().unwrap();
    }

    #[test]
    fn producer_attach_to_missing_segment_fails() {
        let name = unique_name("missing");
        let result = SharedQueue::open_producer(&name);
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    #[test]
    fn fifo_ordering_within_a_single_producer() {
        let name = unique_name("fifo");
        let consumer = SharedQueue::open_consumer(&name, 8).unwrap();
        let producer = SharedQueue::open_producer(&name).unwrap();

        for pid in 0..8 {
            producer.push(ClientDescriptor::new(pid, "/tmp").unwrap()).unwrap();
        }
        for expected in 0..8 {
            assert_eq!(consumer.pop().unwrap().pid, expected);
        }

        consumer.destroy().unwrap();
    }

    #[test]
    fn push_blocks_until_capacity_frees_up() {
        let name = unique_name("blocking");
        let consumer = Arc::new(SharedQueue::open_consumer(&name, 1).unwrap());
        let producer = SharedQueue::open_producer(&name).unwrap();

        producer.push(ClientDescriptor::new(1, "/tmp").unwrap()).unwrap();

        let consumer_clone = consumer.clone();
        let handle = thread::spawn(move || {
            // Give the main thread time to block in push() before we pop.
            thread::sleep(std::time::Duration::from_millis(50));
            consumer_clone.pop().unwrap()
        });

        // This push must block until the spawned thread pops the first entry.
        producer.push(ClientDescriptor::new(2, "/tmp").unwrap()).unwrap();
        let first = handle.join().unwrap();
        assert_eq!(first.pid, 1);
        assert_eq!(consumer.pop().unwrap().pid, 2);

        Arc::try_unwrap(consumer).ok().unwrap().destroy().unwrap();
    }

    #[test]
    fn many_producers_interleave_safely() {
        let name = unique_name("many_producers");
        let capacity = 4;
        let consumer = SharedQueue::open_consumer(&name, capacity).unwrap();

        let producers: Vec<_> = (0..8)
            .map(|pid| {
                let name = name.clone();
                thread::spawn(move || {
                    let producer = SharedQueue::open_producer(&name).unwrap();
                    producer.push(ClientDescriptor::new(pid, "/tmp").unwrap()).unwrap();
                })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(consumer.pop().unwrap().pid);
        }
        for p in producers {
            p.join().unwrap();
        }

        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        consumer.destroy().unwrap();
    }
}
