//! The double-fork detachment recipe (§4.D), adapted to return ordinary
//! values instead of unwinding through `exit()` calls wherever possible —
//! `main` still decides when to actually exit the launcher process.

use std::ffi::CString;

use nix::unistd::{fork, setsid, ForkResult, Pid};

use crate::error::{LifecycleError, LifecycleResult};
use crate::signals::{self, LauncherVerdict};

/// What the calling process should do next after [`daemonize`] returns.
pub enum DaemonizeOutcome {
    /// This process is the short-lived launcher; it has already learned
    /// the daemon's startup verdict and should report it and exit.
    Launcher(LauncherVerdict),
    /// This process is the detached grandchild (or, in `--foreground`
    /// mode, the original process) and should proceed to set up the
    /// queue, pool, and registry, then enter the accept loop. Call
    /// [`notify_launcher_success`]/[`notify_launcher_failure`] with
    /// `launcher_pid` once that setup finishes.
    ///
    /// [`notify_launcher_success`]: crate::signals::notify_launcher_success
    /// [`notify_launcher_failure`]: crate::signals::notify_launcher_failure
    Daemon {
        launcher_pid: i32,
        /// `true` for the detached grandchild, `false` for
        /// `--foreground`. Only the detached case has a separate
        /// launcher process waiting on a verdict signal; a foreground
        /// daemon must report errors by returning them, not by
        /// signalling itself.
        detached: bool,
    },
}

/// Perform the double fork, or skip it entirely for `--foreground`
/// (§4.D step 6).
///
/// # Safety
/// Must be called before any additional threads are spawned: `fork`
/// only duplicates the calling thread, and this process must still be
/// single-threaded for the child's state to be well-defined.
pub unsafe fn daemonize(foreground: bool) -> LifecycleResult<DaemonizeOutcome> {
    if foreground {
        return Ok(DaemonizeOutcome::Daemon {
            launcher_pid: nix::unistd::getpid().as_raw(),
            detached: false,
        });
    }

    let launcher_pid = nix::unistd::getpid().as_raw();
    let verdict_listener = signals::install_verdict_listener()?;

    match fork().map_err(LifecycleError::Fork)? {
        ForkResult::Parent { .. } => {
            let verdict = signals::wait_for_launcher_verdict(verdict_listener);
            Ok(DaemonizeOutcome::Launcher(verdict))
        }
        ForkResult::Child => {
            drop(verdict_listener);
            setsid().map_err(LifecycleError::Setsid)?;

            match fork().map_err(LifecycleError::Fork)? {
                ForkResult::Parent { .. } => {
                    // First child: re-parent the grandchild to init and exit.
                    std::process::exit(0);
                }
                ForkResult::Child => {
                    reset_umask();
                    chdir_root()?;
                    redirect_standard_fds_to_null()?;
                    Ok(DaemonizeOutcome::Daemon {
                        launcher_pid,
                        detached: true,
                    })
                }
            }
        }
    }
}

fn reset_umask() {
    unsafe {
        libc::umask(0o022);
    }
}

fn chdir_root() -> LifecycleResult<()> {
    std::env::set_current_dir("/").map_err(LifecycleError::Io)
}

fn redirect_standard_fds_to_null() -> LifecycleResult<()> {
    let path = CString::new("/dev/null").expect("no interior NUL");
    unsafe {
        let null_fd = libc::open(path.as_ptr(), libc::O_RDWR);
        if null_fd < 0 {
            return Err(LifecycleError::Io(std::io::Error::last_os_error()));
        }
        for fd in 0..=2 {
            libc::dup2(null_fd, fd);
        }
        if null_fd > 2 {
            libc::close(null_fd);
        }
    }
    Ok(())
}

/// Used by `stop`/`status`: send `SIGTERM` to a known daemon pid.
pub fn send_sigterm(pid: i32) -> LifecycleResult<()> {
    nix::sys::signal::kill(Pid::from_raw(pid), nix::sys::signal::Signal::SIGTERM)
        .map_err(LifecycleError::Fork)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_mode_skips_forking_and_is_the_daemon() {
        // SAFETY: test runs single-threaded per #[test] isolation concerns
        // don't apply here since foreground mode never calls fork().
        let outcome = unsafe { daemonize(true).unwrap() };
        match outcome {
            DaemonizeOutcome::Daemon { launcher_pid, detached } => {
                assert_eq!(launcher_pid, std::process::id() as i32);
                assert!(!detached);
            }
            DaemonizeOutcome::Launcher(_) => panic!("foreground mode must not produce a launcher outcome"),
        }
    }
}
