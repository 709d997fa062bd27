//! Client-side errors. Any variant here is fatal for the client process
//! only; the daemon is unaffected (§7).

use rcmd_config::ConfigError;
use rcmd_descriptor::DescriptorError;
use rcmd_queue::QueueError;
use rcmd_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to determine current working directory: {0}")]
    WorkingDir(std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_dir_error_mentions_the_cause() {
        let err = ClientError::WorkingDir(std::io::Error::new(std::io::ErrorKind::InvalidData, "not utf-8"));
        assert!(err.to_string().contains("current working directory"));
    }

    #[test]
    fn transparent_variants_forward_the_source_message() {
        let err: ClientError = rcmd_config::ConfigError::NoHomeDir.into();
        assert_eq!(err.to_string(), rcmd_config::ConfigError::NoHomeDir.to_string());
    }
}
