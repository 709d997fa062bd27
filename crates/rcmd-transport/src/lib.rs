//! Named-pipe transport primitives shared by the client driver (§4.E) and
//! the worker pool (§4.C)'s session routine.
//!
//! A FIFO `open()` blocks until the opposite end is opened — that blocking
//! behavior is the primary synchronization point between a client and its
//! bound worker once the client's descriptor has been handed off through
//! the queue. This crate wraps that behavior plus the accompanying
//! `mkfifo`/`unlink` bookkeeping; it has no opinion on what bytes flow
//! through the pipes.

mod error;

pub use error::{TransportError, TransportResult};

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::trace;

/// Fallback read/write chunk size when `fstat` can't report a preferred
/// block size for a FIFO (this happens on some platforms/filesystems).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Canonical FIFO paths for a client with the given pid, as specified in
/// §6: `<tmp_dir>/<pid>_in` and `<tmp_dir>/<pid>_out`.
pub fn fifo_paths(tmp_dir: &str, pid: i32) -> (String, String) {
    (format!("{tmp_dir}/{pid}_in"), format!("{tmp_dir}/{pid}_out"))
}

/// `mkfifo` at `path`, owner read+write only.
pub fn create_fifo(path: &str) -> TransportResult<()> {
    match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {
            trace!(path, "created fifo");
            Ok(())
        }
        Err(source) => Err(TransportError::Mkfifo {
            path: path.to_string(),
            source,
        }),
    }
}

/// Remove a FIFO path. A missing file is not an error — unlink is used
/// defensively after open, and again during crash-recovery cleanup, so it
/// must be idempotent.
pub fn remove_fifo(path: &str) -> TransportResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(TransportError::Unlink {
            path: path.to_string(),
            source,
        }),
    }
}

/// Open a FIFO write-only. Blocks until a reader opens the other end.
pub fn open_write_blocking(path: &str) -> TransportResult<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_string(),
            source,
        })
}

/// Open a FIFO read-only. Blocks until a writer opens the other end.
pub fn open_read_blocking(path: &str) -> TransportResult<File> {
    OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_string(),
            source,
        })
}

/// Open a FIFO write-only without blocking if no reader is present yet,
/// used only where a caller needs to probe for a reader (not part of the
/// normative handshake in §4.B, but handy for tests and for the worker
/// pool's FIFO-close-based cancellation).
pub fn try_open_write_nonblocking(path: &str) -> TransportResult<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_string(),
            source,
        })
}

/// The OS-reported preferred I/O block size for `file`, falling back to
/// [`DEFAULT_BLOCK_SIZE`] when it can't be determined or is nonsensical.
pub fn preferred_block_size(file: &File) -> usize {
    match nix::sys::stat::fstat(file.as_raw_fd()) {
        Ok(stat) if stat.st_blksize > 0 => stat.st_blksize as usize,
        _ => DEFAULT_BLOCK_SIZE,
    }
}

/// Read from `reader` until end-of-stream, forwarding every chunk to
/// `writer`. Writes loop internally (via [`Write::write_all`]) so short
/// writes never lose bytes. Returns the total number of bytes forwarded.
pub fn forward_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    block_size: usize,
) -> TransportResult<u64> {
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(|source| TransportError::Io {
            path: "<reader>".to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|source| TransportError::Io {
                path: "<writer>".to_string(),
                source,
            })?;
        total += n as u64;
    }
    writer.flush().map_err(|source| TransportError::Io {
        path: "<writer>".to_string(),
        source,
    })?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::thread;

    fn tmp_fifo_path(tag: &str) -> String {
        let dir = std::env::temp_dir();
        format!(
            "{}/rcmd_transport_test_{tag}_{}",
            dir.display(),
            std::process::id()
        )
    }

    #[test]
    fn fifo_paths_match_spec_convention() {
        let (inbound, outbound) = fifo_paths("/tmp", 4242);
        assert_eq!(inbound, "/tmp/4242_in");
        assert_eq!(outbound, "/tmp/4242_out");
    }

    #[test]
    fn create_and_remove_fifo_is_idempotent_on_remove() {
        let path = tmp_fifo_path("create_remove");
        create_fifo(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
        remove_fifo(&path).unwrap();
        // Removing again must not error.
        remove_fifo(&path).unwrap();
    }

    #[test]
    fn open_write_blocks_until_reader_opens() {
        let path = tmp_fifo_path("blocking_open");
        create_fifo(&path).unwrap();

        let reader_path = path.clone();
        let reader = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(50));
            let mut f = open_read_blocking(&reader_path).unwrap();
            let mut line = String::new();
            std::io::BufReader::new(&mut f).read_line(&mut line).unwrap();
            line
        });

        // This would hang forever if the reader never opened.
        let mut writer = open_write_blocking(&path).unwrap();
        writer.write_all(b"hello\n").unwrap();
        drop(writer);

        let line = reader.join().unwrap();
        assert_eq!(line, "hello\n");
        remove_fifo(&path).unwrap();
    }

    #[test]
    fn forward_stream_copies_all_bytes() {
        let mut src = std::io::Cursor::new(b"abcdef".to_vec());
        let mut dst = Vec::new();
        let n = forward_stream(&mut src, &mut dst, 2).unwrap();
        assert_eq!(n, 6);
        assert_eq!(dst, b"abcdef");
    }

    use std::os::unix::fs::FileTypeExt;
}
