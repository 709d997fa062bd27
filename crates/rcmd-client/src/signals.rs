//! Out-of-band signal handling for the client driver (§4.E step 1).
//!
//! The client is a short-lived, single-session process, so unlike the
//! daemon's cooperative-shutdown machinery, reacting to a signal here can
//! simply print a message and exit the process outright — there is no
//! shared state left to tear down cleanly beyond what `Drop` already does
//! for open file descriptors.

use std::thread;

use rcmd_descriptor::signals::SIG_FAILURE;
use signal_hook::iterator::Signals;

/// Spawn the background listener for `SIGINT`, `SIGQUIT`, and `SIG_FAILURE`.
/// Installed once, before the client enqueues its descriptor, so a failure
/// signal arriving at any point afterward is always observed.
pub fn install_client_signal_watcher() {
    let mut signals = Signals::new([libc::SIGINT, libc::SIGQUIT, SIG_FAILURE])
        .expect("failed to install client signal handlers");

    thread::Builder::new()
        .name("rcmd-client-signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                if sig == SIG_FAILURE {
                    println!("Request Canceled");
                    std::process::exit(1);
                } else {
                    println!("Disconnecting");
                    std::process::exit(0);
                }
            }
        })
        .expect("failed to spawn client signal watcher thread");
}
