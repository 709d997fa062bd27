//! Daemon lifecycle: single-instance guard, double-fork detachment, the
//! daemon-wide context, and signal-to-channel translation (§4.D, §9).

mod context;
mod daemonize;
mod error;
mod registry;
pub mod signals;

pub use context::{DaemonContext, SHUTDOWN_SENTINEL_PID};
pub use daemonize::{daemonize, send_sigterm, DaemonizeOutcome};
pub use error::{LifecycleError, LifecycleResult};
pub use registry::DaemonRegistry;
pub use signals::{LauncherVerdict, ShutdownSignal};
