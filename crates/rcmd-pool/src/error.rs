//! Error types for admission and per-session execution.

use thiserror::Error;

/// Admission-time failures: the queue handed back a descriptor the pool
/// could not bind to a runner.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("no free runner slot for pid {0}")]
    NoFreeSlot(i32),
}

/// Failures while a runner is servicing a bound client. None of these are
/// fatal to the daemon; the pool logs them, signals `SIG_FAILURE` to the
/// client, and ends only that session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("working directory '{path}' is not usable: {source}")]
    WorkingDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] rcmd_transport::TransportError),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
