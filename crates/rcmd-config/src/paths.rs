//! Filesystem and namespace paths the daemon and client agree on (§6).

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

const DEFAULT_QUEUE_SHM_NAME: &str = "/shm_my_linker_1207";
const DEFAULT_REGISTRY_SHM_NAME: &str = "/cmds_daemon_pid";
const DEFAULT_TMP_DIR: &str = "/tmp";

/// All paths and shared-memory object names the system touches, each
/// independently overridable via environment variable for test isolation
/// (§6 — multiple test runs must not collide on `/dev/shm`).
#[derive(Debug, Clone)]
pub struct Paths {
    tmp_dir: String,
    queue_shm_name: String,
    registry_shm_name: String,
    log_path: Option<PathBuf>,
}

impl Paths {
    /// Resolve from environment variables, falling back to the documented
    /// defaults.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            tmp_dir: std::env::var("RCMD_TMP_DIR").unwrap_or_else(|_| DEFAULT_TMP_DIR.to_string()),
            queue_shm_name: std::env::var("RCMD_QUEUE_SHM_NAME")
                .unwrap_or_else(|_| DEFAULT_QUEUE_SHM_NAME.to_string()),
            registry_shm_name: std::env::var("RCMD_REGISTRY_SHM_NAME")
                .unwrap_or_else(|_| DEFAULT_REGISTRY_SHM_NAME.to_string()),
            log_path: std::env::var("RCMD_LOG_PATH").ok().map(PathBuf::from),
        })
    }

    pub fn tmp_dir(&self) -> &str {
        &self.tmp_dir
    }

    pub fn queue_shm_name(&self) -> &str {
        &self.queue_shm_name
    }

    pub fn registry_shm_name(&self) -> &str {
        &self.registry_shm_name
    }

    /// The central JSONL log file. Falls back to `~/.rcmd/logs/dev.jsonl`
    /// when `RCMD_LOG_PATH` isn't set.
    pub fn log_path(&self) -> ConfigResult<PathBuf> {
        if let Some(ref path) = self.log_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".rcmd").join("logs").join("dev.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that
    // touch them so they don't observe each other's overrides.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "RCMD_TMP_DIR",
            "RCMD_QUEUE_SHM_NAME",
            "RCMD_REGISTRY_SHM_NAME",
            "RCMD_LOG_PATH",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_match_spec_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let paths = Paths::from_env().unwrap();
        assert_eq!(paths.tmp_dir(), DEFAULT_TMP_DIR);
        assert_eq!(paths.queue_shm_name(), DEFAULT_QUEUE_SHM_NAME);
        assert_eq!(paths.registry_shm_name(), DEFAULT_REGISTRY_SHM_NAME);
    }

    #[test]
    fn env_vars_override_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("RCMD_TMP_DIR", "/custom/tmp");
        std::env::set_var("RCMD_QUEUE_SHM_NAME", "/custom_queue");
        std::env::set_var("RCMD_REGISTRY_SHM_NAME", "/custom_registry");
        std::env::set_var("RCMD_LOG_PATH", "/custom/log.jsonl");

        let paths = Paths::from_env().unwrap();
        assert_eq!(paths.tmp_dir(), "/custom/tmp");
        assert_eq!(paths.queue_shm_name(), "/custom_queue");
        assert_eq!(paths.registry_shm_name(), "/custom_registry");
        assert_eq!(paths.log_path().unwrap(), PathBuf::from("/custom/log.jsonl"));

        clear_env();
    }
}
