// src/error.rs

use std::path::PathBuf;

/// Every failure the agent can report. Verification collapses these into a
/// [`crate::sys::traits::VerificationResult`]; the installer and settings
/// handlers surface their message to the host.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to create directory {path:?}: {source}")]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create file {path:?}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize credentials: {0}")]
    SerializeFailed(#[from] serde_json::Error),

    #[error("failed to spawn {binary:?}: {source}")]
    ProcessSpawnFailed {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for client process: {0}")]
    ProcessWaitFailed(#[source] std::io::Error),

    #[error("temporary credentials at {0:?} could not be fully removed")]
    CleanupIncomplete(PathBuf),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to load settings from {path:?}: {reason}")]
    SettingsLoadFailed { path: PathBuf, reason: String },

    #[error("failed to save settings to {path:?}: {reason}")]
    SettingsSaveFailed { path: PathBuf, reason: String },

    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        Self::DownloadFailed(e.to_string())
    }
}
