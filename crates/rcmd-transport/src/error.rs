//! Error types for the FIFO transport.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("mkfifo failed for '{path}': {source}")]
    Mkfifo {
        path: String,
        #[source]
        source: nix::Error,
    },

    #[error("failed to open '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to unlink '{path}': {source}")]
    Unlink {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;
