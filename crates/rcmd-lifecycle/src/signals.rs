//! Translate OS signals into channel events.
//!
//! Per §9's design note, signals stay at the Unix boundary: every
//! listener below runs a `signal_hook` iterator on a dedicated thread and
//! turns each delivery into an ordinary message, so the rest of the
//! program never runs inside a signal handler.

use std::sync::mpsc::{self, Receiver};
use std::thread;

use rcmd_descriptor::signals::{SIG_FAILURE, SIG_SUCCESS};
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::error::{LifecycleError, LifecycleResult};

/// Event posted when `SIGTERM` arrives, asking the daemon to begin
/// teardown (§4.D).
pub struct ShutdownSignal;

/// Spawn a background listener that turns `SIGTERM` into a message on the
/// returned channel. Installed once, right after the daemon publishes its
/// PID into the registry.
pub fn watch_for_shutdown() -> LifecycleResult<Receiver<ShutdownSignal>> {
    let mut signals =
        Signals::new([libc::SIGTERM]).map_err(LifecycleError::SignalSetup)?;
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("rcmd-sigterm-watcher".into())
        .spawn(move || {
            for _ in signals.forever() {
                debug!("received SIGTERM");
                if tx.send(ShutdownSignal).is_err() {
                    break;
                }
            }
        })
        .map_err(LifecycleError::Io)?;
    Ok(rx)
}

/// The verdict the launcher is waiting for from the (eventual) grandchild
/// daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherVerdict {
    Success,
    Failure,
}

/// Install the `SIG_SUCCESS`/`SIG_FAILURE` handler. Must be called
/// *before* forking: `signal_hook` registers the handler immediately, so
/// any signal the grandchild sends after this point is captured even if
/// the launcher hasn't called [`wait_for_launcher_verdict`] yet.
pub fn install_verdict_listener() -> LifecycleResult<Signals> {
    Signals::new([SIG_SUCCESS, SIG_FAILURE]).map_err(LifecycleError::SignalSetup)
}

/// Block the calling (launcher) process until it receives `SIG_SUCCESS`
/// or `SIG_FAILURE` (§4.D step 5).
pub fn wait_for_launcher_verdict(mut signals: Signals) -> LauncherVerdict {
    match signals.forever().next() {
        Some(sig) if sig == SIG_SUCCESS => LauncherVerdict::Success,
        _ => LauncherVerdict::Failure,
    }
}

/// Signal the launcher that daemonization succeeded.
pub fn notify_launcher_success(launcher_pid: i32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(launcher_pid),
        nix::sys::signal::Signal::try_from(SIG_SUCCESS).expect("SIG_SUCCESS is a valid signal number"),
    );
}

/// Signal the launcher that daemonization failed.
pub fn notify_launcher_failure(launcher_pid: i32) {
    let _ = nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(launcher_pid),
        nix::sys::signal::Signal::try_from(SIG_FAILURE).expect("SIG_FAILURE is a valid signal number"),
    );
}
