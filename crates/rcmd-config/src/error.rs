//! Configuration-loading errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnvValue { var: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
