//! The client-side driver: descriptor construction, queue handoff, and the
//! per-command handshake loop (§4.B, §4.E).

use std::fs::File;
use std::io::{self, BufRead, Write};

use rcmd_descriptor::ClientDescriptor;
use rcmd_queue::SharedQueue;
use tracing::info;

use crate::error::{ClientError, ClientResult};

pub fn run() -> ClientResult<()> {
    let paths = rcmd_config::Paths::from_env()?;
    let pid = std::process::id() as i32;
    let cwd = current_dir_string()?;

    let descriptor = ClientDescriptor::new(pid, &cwd)?;

    crate::signals::install_client_signal_watcher();

    let (inbound_path, _) = rcmd_transport::fifo_paths(paths.tmp_dir(), pid);
    rcmd_transport::create_fifo(&inbound_path)?;

    let queue = SharedQueue::open_producer(paths.queue_shm_name())?;
    queue.push(descriptor)?;

    // Blocks until the worker bound to this session opens the read end.
    let mut inbound_write = rcmd_transport::open_write_blocking(&inbound_path)?;
    rcmd_transport::remove_fifo(&inbound_path)?;

    info!(pid, cwd = %cwd, "connected to daemon");

    let stdin = io::stdin();
    loop {
        print!("{cwd} $ ");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line)?;
        if bytes_read == 0 {
            println!();
            break;
        }

        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }

        if let Err(err) = run_command(line, pid, paths.tmp_dir(), &mut inbound_write) {
            eprintln!("rcmd-client: {err}");
        }
    }

    drop(inbound_write);
    Ok(())
}

/// One round trip of §4.B's per-command handshake: a fresh `P_out` per
/// command, the command line written to the already-open `P_in`, the
/// reply streamed back to our own stdout.
fn run_command(command_line: &str, pid: i32, tmp_dir: &str, inbound_write: &mut File) -> ClientResult<()> {
    let (_, outbound_path) = rcmd_transport::fifo_paths(tmp_dir, pid);
    rcmd_transport::create_fifo(&outbound_path)?;

    let mut line = command_line.to_string();
    line.push('\n');
    inbound_write.write_all(line.as_bytes())?;
    inbound_write.flush()?;

    let mut outbound_read = rcmd_transport::open_read_blocking(&outbound_path)?;
    rcmd_transport::remove_fifo(&outbound_path)?;

    let block_size = rcmd_transport::preferred_block_size(&outbound_read);
    let mut stdout = io::stdout();
    rcmd_transport::forward_stream(&mut outbound_read, &mut stdout, block_size)?;
    Ok(())
}

fn current_dir_string() -> ClientResult<String> {
    let cwd = std::env::current_dir().map_err(ClientError::WorkingDir)?;
    cwd.to_str()
        .map(str::to_string)
        .ok_or_else(|| ClientError::WorkingDir(io::Error::new(io::ErrorKind::InvalidData, "cwd is not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;

    #[test]
    fn current_dir_string_matches_std_env() {
        let expected = std::env::current_dir().unwrap().to_str().unwrap().to_string();
        assert_eq!(current_dir_string().unwrap(), expected);
    }

    #[test]
    fn run_command_writes_the_line_and_streams_the_reply_back() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_dir = dir.path().to_str().unwrap().to_string();
        let pid = std::process::id() as i32;

        let (inbound_path, outbound_path) = rcmd_transport::fifo_paths(&tmp_dir, pid);
        rcmd_transport::create_fifo(&inbound_path).unwrap();

        // Act as the "worker": open the inbound read end in a background
        // thread, since opening a fifo for reading blocks until a writer
        // attaches.
        let inbound_path_clone = inbound_path.clone();
        let reader = thread::spawn(move || {
            let mut read_end = rcmd_transport::open_read_blocking(&inbound_path_clone).unwrap();
            let mut received = String::new();
            read_end.read_to_string(&mut received).unwrap();
            received
        });

        let mut inbound_write = rcmd_transport::open_write_blocking(&inbound_path).unwrap();

        // run_command() itself creates P_out; the "worker" side only waits
        // for it to appear before opening its write end.
        let outbound_path_clone = outbound_path.clone();
        let writer = thread::spawn(move || {
            while std::fs::metadata(&outbound_path_clone).is_err() {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            let mut write_end = rcmd_transport::open_write_blocking(&outbound_path_clone).unwrap();
            use std::io::Write as _;
            write_end.write_all(b"hello back\n").unwrap();
        });

        run_command("echo hi", pid, &tmp_dir, &mut inbound_write).unwrap();
        drop(inbound_write);

        let received = reader.join().unwrap();
        writer.join().unwrap();
        assert_eq!(received, "echo hi\n");
    }
}
