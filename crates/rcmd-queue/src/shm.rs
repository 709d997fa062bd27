//! Low-level POSIX shared-memory helpers: `shm_open` + `mmap`.
//!
//! Mirrors the two-step "map the header, read the real size, remap the
//! whole region" dance used for variable-length shared-memory segments:
//! a consumer doesn't know `capacity` until it has read the header.

use std::ffi::CString;

use libc::{
    c_int, c_uint, c_void, close, ftruncate, mmap, munmap, off_t, shm_open, shm_unlink,
    MAP_FAILED, MAP_SHARED, O_CREAT, O_EXCL, O_RDWR, PROT_READ, PROT_WRITE, S_IRUSR, S_IWUSR,
};

use crate::error::{QueueError, QueueResult};

/// Create a shared memory object exclusively (fails if it already exists)
/// and map `size` bytes of it read-write.
pub(crate) fn create_shm(name: &str, size: usize) -> QueueResult<(*mut u8, c_int)> {
    let c_name = CString::new(name).map_err(|e| QueueError::SharedMemory(e.to_string()))?;

    unsafe {
        let fd = shm_open(
            c_name.as_ptr(),
            O_CREAT | O_EXCL | O_RDWR,
            (S_IRUSR | S_IWUSR) as c_uint,
        );
        if fd == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(QueueError::AlreadyExists(name.to_string()));
            }
            return Err(QueueError::SharedMemory(format!(
                "shm_open failed for '{name}': {err}"
            )));
        }

        if ftruncate(fd, size as off_t) == -1 {
            let err = std::io::Error::last_os_error();
            close(fd);
            let _ = shm_unlink(c_name.as_ptr());
            return Err(QueueError::SharedMemory(format!("ftruncate failed: {err}")));
        }

        let ptr = mmap(std::ptr::null_mut(), size, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0);
        if ptr == MAP_FAILED {
            let err = std::io::Error::last_os_error();
            close(fd);
            let _ = shm_unlink(c_name.as_ptr());
            return Err(QueueError::Mmap(format!("mmap failed: {err}")));
        }

        Ok((ptr as *mut u8, fd))
    }
}

/// Open an existing shared-memory object and map exactly `size` bytes.
pub(crate) fn open_shm(name: &str, size: usize) -> QueueResult<(*mut u8, c_int)> {
    let c_name = CString::new(name).map_err(|e| QueueError::SharedMemory(e.to_string()))?;

    unsafe {
        let fd = shm_open(c_name.as_ptr(), O_RDWR, 0);
        if fd == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Err(QueueError::NotFound(name.to_string()));
            }
            return Err(QueueError::SharedMemory(format!(
                "shm_open failed for '{name}': {err}"
            )));
        }

        let ptr = mmap(std::ptr::null_mut(), size, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0);
        if ptr == MAP_FAILED {
            let err = std::io::Error::last_os_error();
            close(fd);
            return Err(QueueError::Mmap(format!("mmap failed: {err}")));
        }

        Ok((ptr as *mut u8, fd))
    }
}

/// Map just enough of an existing segment to read its header, so the
/// caller can learn `capacity` (and thus the real size) before the full
/// remap. Unmapped again before returning.
pub(crate) fn peek_header_size(name: &str, header_size: usize) -> QueueResult<usize>
where
{
    let (ptr, fd) = open_shm(name, header_size)?;
    let size = unsafe {
        let header = &*(ptr as *const crate::header::QueueHeader);
        let size = header.total_size();
        munmap(ptr as *mut c_void, header_size);
        size
    };
    unsafe { close(fd) };
    Ok(size)
}

/// Unmap and close a mapping. Safe to call at most once per mapping.
pub(crate) unsafe fn close_shm(ptr: *mut u8, size: usize, fd: c_int) {
    if !ptr.is_null() {
        munmap(ptr as *mut c_void, size);
    }
    if fd >= 0 {
        close(fd);
    }
}

/// Remove the shared-memory object from the OS namespace.
pub(crate) fn unlink_shm(name: &str) -> QueueResult<()> {
    let c_name = CString::new(name).map_err(|e| QueueError::SharedMemory(e.to_string()))?;
    unsafe {
        if shm_unlink(c_name.as_ptr()) == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(QueueError::SharedMemory(format!("shm_unlink failed: {err}")));
            }
        }
    }
    Ok(())
}
