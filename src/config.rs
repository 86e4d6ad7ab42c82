// src/config.rs

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

pub const DEFAULT_CLIENT_URL: &str = "https://mirror-hyper-install.s3.amazonaws.com/hyper";
pub const CLIENT_BINARY_NAME: &str = "hyper";
pub const SETTINGS_FILE_NAME: &str = "hyper-commons.json";
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AgentConfig {
    // Network boundary
    pub socket_path: PathBuf,

    // Host data directory (JENKINS_HOME). The client lives in `<data_dir>/bin`.
    pub data_dir: PathBuf,

    // Parent of the per-invocation credential directories
    pub tmp_root: PathBuf,

    pub client_url: String,
    pub verify_timeout: Duration,
}

impl AgentConfig {
    pub fn load() -> Result<Self, AgentError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves the configuration from an arbitrary key lookup so tests don't
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let verify_timeout = match lookup("HYPER_COMMONS_VERIFY_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| AgentError::InvalidConfig {
                    key: "HYPER_COMMONS_VERIFY_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(AgentError::InvalidConfig {
                        key: "HYPER_COMMONS_VERIFY_TIMEOUT_SECS",
                        reason: "timeout must be at least one second".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
        };

        Ok(Self {
            socket_path: lookup("HYPER_COMMONS_SOCKET_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/run/hyper-commons/agent.sock")),

            data_dir: lookup("HYPER_COMMONS_DATA_DIR")
                .or_else(|| lookup("JENKINS_HOME"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/lib/jenkins")),

            tmp_root: lookup("HYPER_COMMONS_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),

            client_url: lookup("HYPER_COMMONS_CLIENT_URL")
                .unwrap_or_else(|| DEFAULT_CLIENT_URL.to_string()),

            verify_timeout,
        })
    }

    pub fn client_binary_path(&self) -> PathBuf {
        self.data_dir.join("bin").join(CLIENT_BINARY_NAME)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }
}
