//! `DaemonRegistry`: a one-integer named shared-memory object whose mere
//! existence is the "a daemon is running" predicate (§3, §4.D).
//!
//! Deliberately separate from [`rcmd_queue::SharedQueue`]'s shared-memory
//! machinery — the registry's layout (one `i32`, no semaphores, no ring
//! buffer) doesn't warrant sharing that code, but the `shm_open`/`mmap`
//! calls below follow the identical recipe.

use std::ffi::CString;
use std::os::raw::c_int;

use libc::{
    c_uint, c_void, close, ftruncate, mmap, munmap, off_t, shm_open, shm_unlink, MAP_FAILED,
    MAP_SHARED, O_CREAT, O_EXCL, O_RDWR, PROT_READ, PROT_WRITE, S_IRUSR, S_IWUSR,
};

use crate::error::{LifecycleError, LifecycleResult};

const SIZE: usize = std::mem::size_of::<i32>();

/// A handle to the daemon's well-known PID segment.
pub struct DaemonRegistry {
    ptr: *mut i32,
    fd: c_int,
    name: String,
}

unsafe impl Send for DaemonRegistry {}
unsafe impl Sync for DaemonRegistry {}

impl DaemonRegistry {
    /// Create the segment exclusively and publish `pid`. Fails if a
    /// registry already exists — that failure is exactly the
    /// single-instance guard described in §4.D.
    pub fn create(name: &str, pid: i32) -> LifecycleResult<Self> {
        let c_name = CString::new(name).map_err(|e| LifecycleError::SharedMemory(e.to_string()))?;

        let (ptr, fd) = unsafe {
            let fd = shm_open(c_name.as_ptr(), O_CREAT | O_EXCL | O_RDWR, (S_IRUSR | S_IWUSR) as c_uint);
            if fd == -1 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EEXIST) {
                    // Read the existing registry to report who's running.
                    let existing = Self::open(name);
                    let running_pid = existing.map(|r| r.pid()).unwrap_or(-1);
                    return Err(LifecycleError::AlreadyRunning(running_pid));
                }
                return Err(LifecycleError::SharedMemory(format!("shm_open failed: {err}")));
            }
            if ftruncate(fd, SIZE as off_t) == -1 {
                let err = std::io::Error::last_os_error();
                close(fd);
                let _ = shm_unlink(c_name.as_ptr());
                return Err(LifecycleError::SharedMemory(format!("ftruncate failed: {err}")));
            }
            let ptr = mmap(std::ptr::null_mut(), SIZE, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0);
            if ptr == MAP_FAILED {
                let err = std::io::Error::last_os_error();
                close(fd);
                let _ = shm_unlink(c_name.as_ptr());
                return Err(LifecycleError::SharedMemory(format!("mmap failed: {err}")));
            }
            (ptr as *mut i32, fd)
        };

        unsafe { std::ptr::write(ptr, pid) };
        Ok(Self {
            ptr,
            fd,
            name: name.to_string(),
        })
    }

    /// Attach to an existing registry (used by `stop`/`status`).
    pub fn open(name: &str) -> LifecycleResult<Self> {
        let c_name = CString::new(name).map_err(|e| LifecycleError::SharedMemory(e.to_string()))?;

        let (ptr, fd) = unsafe {
            let fd = shm_open(c_name.as_ptr(), O_RDWR, 0);
            if fd == -1 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ENOENT) {
                    return Err(LifecycleError::NotRunning);
                }
                return Err(LifecycleError::SharedMemory(format!("shm_open failed: {err}")));
            }
            let ptr = mmap(std::ptr::null_mut(), SIZE, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0);
            if ptr == MAP_FAILED {
                let err = std::io::Error::last_os_error();
                close(fd);
                return Err(LifecycleError::SharedMemory(format!("mmap failed: {err}")));
            }
            (ptr as *mut i32, fd)
        };

        Ok(Self {
            ptr,
            fd,
            name: name.to_string(),
        })
    }

    /// The published PID.
    pub fn pid(&self) -> i32 {
        unsafe { std::ptr::read(self.ptr) }
    }

    /// Unlink the segment from the OS namespace. Called once, during
    /// teardown.
    pub fn destroy(self) -> LifecycleResult<()> {
        let c_name = CString::new(self.name.clone()).map_err(|e| LifecycleError::SharedMemory(e.to_string()))?;
        unsafe {
            munmap(self.ptr as *mut c_void, SIZE);
            close(self.fd);
            if shm_unlink(c_name.as_ptr()) == -1 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ENOENT) {
                    return Err(LifecycleError::SharedMemory(format!("shm_unlink failed: {err}")));
                }
            }
        }
        std::mem::forget(self);
        Ok(())
    }
}

impl Drop for DaemonRegistry {
    fn drop(&mut self) {
        unsafe {
            munmap(self.ptr as *mut c_void, SIZE);
            close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/rcmd_registry_test_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn create_then_open_reads_back_the_pid() {
        let name = unique_name("roundtrip");
        let created = DaemonRegistry::create(&name, 4242).unwrap();
        let opened = DaemonRegistry::open(&name).unwrap();
        assert_eq!(opened.pid(), 4242);
        created.destroy().unwrap();
    }

    #[test]
    fn second_create_fails_as_already_running() {
        let name = unique_name("dup");
        let first = DaemonRegistry::create(&name, 111).unwrap();
        let second = DaemonRegistry::create(&name, 222);
        assert!(matches!(second, Err(LifecycleError::AlreadyRunning(111))));
        first.destroy().unwrap();
    }

    #[test]
    fn open_missing_registry_is_not_running() {
        let name = unique_name("missing");
        assert!(matches!(DaemonRegistry::open(&name), Err(LifecycleError::NotRunning)));
    }

    #[test]
    fn destroy_removes_segment_from_namespace() {
        let name = unique_name("teardown");
        let reg = DaemonRegistry::create(&name, 1).unwrap();
        reg.destroy().unwrap();
        assert!(matches!(DaemonRegistry::open(&name), Err(LifecycleError::NotRunning)));
    }
}
