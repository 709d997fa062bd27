//! Pure data types for the remote command execution core.
//!
//! Everything in this crate is `#[repr(C)]`, `Copy`, and allocation-free so
//! that it can be `memcpy`'d across a shared-memory boundary. No I/O, no
//! async, no dependency on the transport or queue crates.

use std::ffi::CStr;
use thiserror::Error;

pub mod signals {
    //! The rendezvous signal numbers shared by every binary and library
    //! crate in the workspace. Kept in one place so the daemon, the worker
    //! pool, and the client driver agree on the mapping without depending
    //! on each other.

    /// daemon → client: the session aborted (no free slot, exec failure,
    /// worker crash, or daemon shutdown while the client was bound).
    pub const SIG_FAILURE: i32 = libc::SIGUSR1;

    /// daemon grandchild → launcher: daemonization completed successfully.
    pub const SIG_SUCCESS: i32 = libc::SIGUSR2;
}

/// Maximum length of a working directory path, including the NUL terminator.
pub const WORKING_DIR_CAP: usize = 512;

/// A client's process id, as reported by the OS.
pub type Pid = i32;

/// Errors constructing a [`ClientDescriptor`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("working directory is {len} bytes, exceeds cap of {cap} (including NUL)")]
    WorkingDirTooLong { len: usize, cap: usize },
    #[error("working directory must be an absolute path")]
    NotAbsolute,
    #[error("working directory contains an interior NUL byte")]
    InteriorNul,
    #[error("working directory is not valid UTF-8")]
    NotUtf8,
}

/// Fixed-size, trivially copyable record describing a connected client.
///
/// Transmitted through shared memory between the client process and the
/// daemon's accept loop, then copied once more into a bound [`Runner`] slot.
/// Every enqueued descriptor corresponds to a live client that has already
/// created (or is about to create) its inbound FIFO at the canonical path
/// derived from `pid`.
///
/// [`Runner`]: rcmd-pool's Runner type (not depended on here to keep this
/// crate I/O- and layer-free).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ClientDescriptor {
    /// Process id of the client. Used both to route signals and to derive
    /// the per-session FIFO paths (`<tmp>/<pid>_in`, `<tmp>/<pid>_out`).
    pub pid: Pid,
    /// NUL-terminated absolute path, zero-padded to [`WORKING_DIR_CAP`].
    working_dir: [u8; WORKING_DIR_CAP],
}

impl ClientDescriptor {
    /// Build a descriptor for `pid`, bound to `working_dir`.
    ///
    /// `working_dir` must be an absolute path, UTF-8, with no interior NUL,
    /// and fit (with its NUL terminator) inside [`WORKING_DIR_CAP`] bytes.
    pub fn new(pid: Pid, working_dir: &str) -> Result<Self, DescriptorError> {
        if !working_dir.starts_with('/') {
            return Err(DescriptorError::NotAbsolute);
        }
        if working_dir.contains('\0') {
            return Err(DescriptorError::InteriorNul);
        }
        let bytes = working_dir.as_bytes();
        // +1 for the NUL terminator.
        if bytes.len() + 1 > WORKING_DIR_CAP {
            return Err(DescriptorError::WorkingDirTooLong {
                len: bytes.len() + 1,
                cap: WORKING_DIR_CAP,
            });
        }

        let mut buf = [0u8; WORKING_DIR_CAP];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            pid,
            working_dir: buf,
        })
    }

    /// The working directory the bound worker must `chdir` into.
    pub fn working_dir(&self) -> Result<&str, DescriptorError> {
        let cstr = CStr::from_bytes_until_nul(&self.working_dir)
            .expect("working_dir is always NUL-terminated by construction");
        cstr.to_str().map_err(|_| DescriptorError::NotUtf8)
    }

    /// Canonical path of this client's inbound (command) FIFO.
    pub fn inbound_fifo_path(&self, tmp_dir: &str) -> String {
        format!("{tmp_dir}/{}_in", self.pid)
    }

    /// Canonical path of this client's outbound (reply) FIFO.
    pub fn outbound_fifo_path(&self, tmp_dir: &str) -> String {
        format!("{tmp_dir}/{}_out", self.pid)
    }
}

impl std::fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("pid", &self.pid)
            .field("working_dir", &self.working_dir().unwrap_or("<invalid>"))
            .finish()
    }
}
