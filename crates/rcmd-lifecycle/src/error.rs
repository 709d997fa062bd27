//! Errors from daemonization, the PID registry, and shutdown wiring.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("a daemon is already running (pid {0})")]
    AlreadyRunning(i32),

    #[error("no daemon is currently running")]
    NotRunning,

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("setsid failed: {0}")]
    Setsid(#[source] nix::Error),

    #[error("failed to install signal handler: {0}")]
    SignalSetup(#[source] std::io::Error),

    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
