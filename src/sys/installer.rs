// src/sys/installer.rs

use async_trait::async_trait;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::CLIENT_BINARY_NAME;
use crate::error::AgentError;
use crate::sys::traits::ClientInstaller;

/// Fetches the hyper client over HTTP(S) into `<data_dir>/bin/hyper`.
pub struct HttpClientInstaller {
    url: String,
    client: reqwest::Client,
}

impl HttpClientInstaller {
    pub fn new(url: String) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hyper-commons-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl ClientInstaller for HttpClientInstaller {
    async fn install(&self, destination_root: &Path) -> Result<PathBuf, AgentError> {
        info!(url = %self.url, "downloading hyper client");

        let mut response = self.client.get(&self.url).send().await?.error_for_status()?;

        let bin_dir = destination_root.join("bin");
        fs::create_dir_all(&bin_dir)
            .await
            .map_err(|source| AgentError::DirectoryCreateFailed {
                path: bin_dir.clone(),
                source,
            })?;
        let target = bin_dir.join(CLIENT_BINARY_NAME);

        // 1. Stage next to the target. The staged file is removed on any early
        //    return, so an interrupted download never replaces a working binary.
        let staged = tempfile::Builder::new()
            .prefix(".hyper-download-")
            .tempfile_in(&bin_dir)
            .map_err(|source| AgentError::FileCreateFailed {
                path: bin_dir.clone(),
                source,
            })?;
        let (std_file, staged_path) = staged.into_parts();
        let mut file = fs::File::from_std(std_file);

        let write_failed = |source: std::io::Error| AgentError::WriteFailed {
            path: staged_path.to_path_buf(),
            source,
        };

        // 2. Stream the body chunk by chunk
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        drop(file);

        // 3. Executable bit is best-effort
        if let Err(e) = fs::set_permissions(&staged_path, Permissions::from_mode(0o755)).await {
            warn!(path = ?staged_path, error = %e, "could not mark hyper client executable");
        }

        // 4. Atomic swap into place
        staged_path
            .persist(&target)
            .map_err(|e| AgentError::WriteFailed {
                path: target.clone(),
                source: e.error,
            })?;

        info!(path = ?target, bytes = written, "hyper client installed");
        Ok(target)
    }
}
