//! A single runner slot: the daemon-local binding of one worker thread to
//! one client for the lifetime of a session.

use std::io::{BufRead, BufReader};
use std::os::unix::io::AsRawFd;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use rcmd_descriptor::{signals, ClientDescriptor};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// A point-in-time snapshot of a finished or running session, used only
/// for logging/telemetry — never consulted for correctness.
#[derive(Debug, Clone, Copy)]
pub struct RunnerStats {
    pub id: usize,
    pub pid: i32,
    pub session_duration: std::time::Duration,
}

/// One slot in the worker pool.
///
/// `active` is the sole cross-thread handoff: the accept loop only reads
/// it to find free slots, and the owning thread clears it exactly once,
/// on its way out. Transient misses (the accept loop observing a slot as
/// busy one instant before it frees up) are acceptable — see §5.
pub struct Runner {
    id: usize,
    active: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    /// Raw fd of the session's open inbound FIFO, or -1 when none is
    /// open. Lets the pool's cancellation path force a pending `read` to
    /// unblock by closing the fd out from under the worker thread.
    inbound_fd: Arc<AtomicI32>,
    client_pid: Arc<AtomicI32>,
    handle: Mutex<Option<JoinHandle<Option<RunnerStats>>>>,
}

impl Runner {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            active: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            inbound_fd: Arc::new(AtomicI32::new(-1)),
            client_pid: Arc::new(AtomicI32::new(0)),
            handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Bind `desc` to this slot and spawn its session thread. Caller must
    /// have already confirmed the slot is idle.
    pub(crate) fn bind(&self, desc: ClientDescriptor, tmp_dir: String) {
        self.active.store(true, Ordering::SeqCst);
        self.shutdown.store(false, Ordering::SeqCst);
        self.client_pid.store(desc.pid, Ordering::SeqCst);
        self.inbound_fd.store(-1, Ordering::SeqCst);

        let id = self.id;
        let active = self.active.clone();
        let shutdown = self.shutdown.clone();
        let inbound_fd = self.inbound_fd.clone();

        let handle = std::thread::Builder::new()
            .name(format!("rcmd-runner-{id}"))
            .spawn(move || {
                let stats = session_routine(id, desc, &tmp_dir, &shutdown, &inbound_fd);
                active.store(false, Ordering::SeqCst);
                stats
            })
            .expect("spawning a runner thread should not fail under normal resource limits");

        *self.handle.lock().expect("runner handle mutex poisoned") = Some(handle);
    }

    /// Cooperative cancellation: flip the shutdown flag and force-close
    /// the runner's inbound fd (if a session is mid-read), then join.
    ///
    /// Matches §9's design note: prefer cooperative cancellation with an
    /// explicit shutdown check over asynchronous thread cancellation.
    pub(crate) fn cancel_and_join(&self) -> Option<RunnerStats> {
        if !self.is_active() {
            return None;
        }
        self.shutdown.store(true, Ordering::SeqCst);

        let fd = self.inbound_fd.swap(-1, Ordering::SeqCst);
        if fd >= 0 {
            // SAFETY: `fd` was obtained from a File this runner's thread
            // owns; the thread checks `shutdown` immediately after its
            // blocked read returns and will `mem::forget` its File
            // instead of closing it again, so this is the single close.
            unsafe {
                libc::close(fd);
            }
        }

        let pid = self.client_pid.load(Ordering::SeqCst);
        if pid > 0 {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid),
                nix::sys::signal::Signal::try_from(signals::SIG_FAILURE)
                    .expect("SIG_FAILURE is a valid signal number"),
            );
        }

        let handle = self.handle.lock().expect("runner handle mutex poisoned").take();
        handle.and_then(|h| h.join().unwrap_or(None))
    }
}

fn signal_failure(pid: i32) {
    if pid <= 0 {
        return;
    }
    if let Err(e) = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid),
        nix::sys::signal::Signal::try_from(signals::SIG_FAILURE)
            .expect("SIG_FAILURE is a valid signal number"),
    ) {
        debug!(pid, error = %e, "failed to signal client (it may have already exited)");
    }
}

/// The per-runner session loop described in §4.C. Runs entirely on the
/// runner's own thread; returns telemetry for the pool to log.
fn session_routine(
    id: usize,
    desc: ClientDescriptor,
    tmp_dir: &str,
    shutdown: &AtomicBool,
    inbound_fd: &AtomicI32,
) -> Option<RunnerStats> {
    let start = Instant::now();
    let pid = desc.pid;

    let working_dir = match desc.working_dir() {
        Ok(dir) => dir.to_string(),
        Err(e) => {
            warn!(runner = id, pid, error = %e, "descriptor has an unusable working directory");
            signal_failure(pid);
            return None;
        }
    };
    if let Err(source) = std::fs::metadata(&working_dir).and_then(|m| {
        if m.is_dir() {
            Ok(())
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"))
        }
    }) {
        let err = SessionError::WorkingDir {
            path: working_dir.clone(),
            source,
        };
        warn!(runner = id, pid, error = %err, "chdir target unusable, aborting session");
        signal_failure(pid);
        return None;
    }

    let inbound_path = desc.inbound_fifo_path(tmp_dir);
    let inbound_file = match rcmd_transport::open_read_blocking(&inbound_path) {
        Ok(f) => f,
        Err(e) => {
            warn!(runner = id, pid, error = %e, "failed to open inbound fifo");
            signal_failure(pid);
            return None;
        }
    };
    inbound_fd.store(inbound_file.as_raw_fd(), Ordering::SeqCst);

    let block_size = rcmd_transport::preferred_block_size(&inbound_file);
    let mut reader = BufReader::with_capacity(block_size, inbound_file);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!(runner = id, pid, "shutdown observed at top of session loop");
            break;
        }

        let mut line = String::new();
        let n = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(e) => {
                debug!(runner = id, pid, error = %e, "inbound read failed, ending session");
                break;
            }
        };
        if n == 0 {
            debug!(runner = id, pid, "client reached end of stream");
            break;
        }

        let command_line = line.trim_end_matches(['\n', '\r']);
        let tokens: Vec<&str> = command_line.split_whitespace().collect();
        // `line` is reallocated fresh each iteration by the `let mut line`
        // above; nothing from a previous command carries over.
        if tokens.is_empty() {
            continue;
        }

        if !run_command(id, pid, &tokens, &working_dir, &desc, tmp_dir) {
            break;
        }
    }

    // If we were cancelled, the pool already closed `inbound_fd` once;
    // dropping `reader` here would close it a second time. Forget it
    // instead and let the pool's close be the only one.
    if shutdown.load(Ordering::SeqCst) {
        std::mem::forget(reader);
    }

    let duration = start.elapsed();
    info!(runner = id, pid, duration_ms = duration.as_millis(), "session ended");
    Some(RunnerStats {
        id,
        pid,
        session_duration: duration,
    })
}

/// Run one command line, redirecting its stdout to the client's outbound
/// FIFO. Returns `false` if the session should end (exec failure).
fn run_command(
    runner_id: usize,
    pid: i32,
    tokens: &[&str],
    working_dir: &str,
    desc: &ClientDescriptor,
    tmp_dir: &str,
) -> bool {
    let outbound_path = desc.outbound_fifo_path(tmp_dir);
    let out_file = match rcmd_transport::open_write_blocking(&outbound_path) {
        Ok(f) => f,
        Err(e) => {
            warn!(runner = runner_id, pid, error = %e, "failed to open outbound fifo");
            signal_failure(pid);
            return false;
        }
    };

    let program = tokens[0];
    let mut command = Command::new(program);
    command
        .args(&tokens[1..])
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .stdout(Stdio::from(out_file));

    // §9 Open Question 1: a spawn `Result::Err` here means the OS could
    // not start the process at all (not found, not executable). A
    // successfully spawned process that later exits non-zero is an
    // ordinary session outcome, not a failure signal.
    match command.spawn() {
        Ok(mut child) => {
            let _ = child.wait();
            true
        }
        Err(source) => {
            let err = SessionError::Spawn {
                command: program.to_string(),
                source,
            };
            warn!(runner = runner_id, pid, command = program, error = %err, "exec failed");
            signal_failure(pid);
            false
        }
    }
}
