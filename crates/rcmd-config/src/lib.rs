//! Runtime configuration and paths module (§3's `DaemonConfig`, §6's
//! filesystem/shared-memory namespace). No config file is required; every
//! override is an environment variable, matching the "local single-host
//! tool" scope of §1.

mod error;
mod paths;

pub use error::{ConfigError, ConfigResult};
pub use paths::Paths;

const DEFAULT_CAPACITY: u32 = 8;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Daemon-wide tunables, resolved once at startup (§3).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub capacity: u32,
    pub log_level: String,
    pub paths: Paths,
}

impl DaemonConfig {
    /// Resolve from environment variables. `capacity_override` takes
    /// precedence over `RCMD_CAPACITY` and the default, modeling the
    /// daemon CLI's `--capacity` flag (§6).
    pub fn load(capacity_override: Option<u32>) -> ConfigResult<Self> {
        let paths = Paths::from_env()?;

        let capacity = capacity_override
            .or_else(|| std::env::var("RCMD_CAPACITY").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(DEFAULT_CAPACITY);

        let log_level = std::env::var("RCMD_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            capacity,
            log_level,
            paths,
        })
    }
}
