use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::AgentError;
use crate::sys::settings::{ConnectionSettings, PersistedSettings};

// ==============================================================================
// 1. Persisted Settings (Host Contract)
// ==============================================================================

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Loads the persisted record. A store that was never written yields the
    /// empty record rather than an error.
    async fn load(&self) -> Result<PersistedSettings, AgentError>;

    async fn save(&self, settings: &PersistedSettings) -> Result<(), AgentError>;
}

// ==============================================================================
// 2. Connectivity Verification
// ==============================================================================

pub const MSG_CONNECTION_OK: &str = "connection test succeeded!";
pub const MSG_CONNECTION_FAILED: &str = "connection test failed!";
pub const MSG_CONNECTION_TIMED_OUT: &str = "connection test timed out!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Success,
    /// A step failed or the client exited non-zero. The reason is for logs;
    /// the host only ever sees the generic failure message.
    Failed(String),
    /// The client outlived the timeout and was terminated.
    TimedOut,
    /// Something escaped the normal flow.
    Error(String),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable message shown on the settings page.
    pub fn message(&self) -> String {
        match self {
            Self::Success => MSG_CONNECTION_OK.to_string(),
            Self::Failed(_) => MSG_CONNECTION_FAILED.to_string(),
            Self::TimedOut => MSG_CONNECTION_TIMED_OUT.to_string(),
            Self::Error(message) => format!("connection test error: {}", message),
        }
    }
}

#[async_trait]
pub trait ConnectivityVerifier: Send + Sync {
    /// Materializes `settings`, runs the client against them and removes the
    /// credentials again, whatever the outcome.
    /// Takes the settings by value: the caller hands over the secrets and they
    /// are zeroized when the verification finishes.
    async fn verify(&self, settings: ConnectionSettings) -> VerificationResult;
}

// ==============================================================================
// 3. Client Installation
// ==============================================================================

#[async_trait]
pub trait ClientInstaller: Send + Sync {
    /// Downloads the client into `<destination_root>/bin` and returns the
    /// installed path.
    async fn install(&self, destination_root: &Path) -> Result<PathBuf, AgentError>;
}
