// src/sys/settings.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs as std_fs;
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::LazyLock;
use tokio::fs as tokio_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::AgentError;
use crate::sys::secrets::StoredSecret;
use crate::sys::traits::SettingsStore;

// `tcp://us-west-1.hyper.sh:443`, `https://x`, ... The value ends up as a
// process argument, so whitespace and a leading dash are never allowed.
static ENDPOINT_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").unwrap());

/// Credentials for one Hyper_ endpoint plus the optional Docker Hub login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub registry_url: String,
    pub access_id: String,
    pub secret_key: StoredSecret,
    pub registry_email: String,
    pub registry_username: String,
    pub registry_password: StoredSecret,
}

/// Registry login, only handed out when all three fields are filled in.
#[derive(Debug, Clone, Copy)]
pub struct RegistryAuth<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a StoredSecret,
}

impl ConnectionSettings {
    pub fn registry_auth(&self) -> Option<RegistryAuth<'_>> {
        if self.registry_email.is_empty()
            || self.registry_username.is_empty()
            || self.registry_password.is_empty()
        {
            return None;
        }

        Some(RegistryAuth {
            email: &self.registry_email,
            username: &self.registry_username,
            password: &self.registry_password,
        })
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.registry_url.is_empty() {
            return Err(AgentError::InvalidSettings("registry URL is required".into()));
        }
        if self.registry_url.starts_with('-') || !ENDPOINT_FORMAT.is_match(&self.registry_url) {
            return Err(AgentError::InvalidSettings(format!(
                "registry URL '{}' must look like <scheme>://<host>",
                self.registry_url
            )));
        }
        if self.access_id.is_empty() {
            return Err(AgentError::InvalidSettings("access id is required".into()));
        }
        if self.secret_key.is_empty() {
            return Err(AgentError::InvalidSettings("secret key is required".into()));
        }
        Ok(())
    }
}

/// The record the host persists between restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSettings {
    #[serde(flatten)]
    pub connection: ConnectionSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedSettings {
    pub fn touched(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            updated_at: Some(Utc::now()),
        }
    }
}

/// JSON-file backed settings store living in the host's data directory.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_error(&self, reason: impl ToString) -> AgentError {
        AgentError::SettingsLoadFailed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn save_error(&self, reason: impl ToString) -> AgentError {
        AgentError::SettingsSaveFailed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<PersistedSettings, AgentError> {
        let raw = match tokio_fs::read(&self.path).await {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no persisted settings, starting empty");
                return Ok(PersistedSettings::default());
            }
            Err(e) => return Err(self.load_error(e)),
        };

        serde_json::from_slice(&raw).map_err(|e| self.load_error(e))
    }

    async fn save(&self, settings: &PersistedSettings) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            tokio_fs::create_dir_all(parent)
                .await
                .map_err(|e| self.save_error(e))?;
        }

        let body = Zeroizing::new(serde_json::to_vec_pretty(settings).map_err(|e| self.save_error(e))?);

        // Write next to the target and rename, so a crash never leaves a torn record.
        let tmp_path = self.path.with_extension("json.tmp");
        let mut opts = std_fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true).mode(0o600);

        let write_result = async {
            let mut file = tokio_fs::OpenOptions::from(opts).open(&tmp_path).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            tokio_fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio_fs::remove_file(&tmp_path).await;
            return Err(self.save_error(e));
        }

        info!(path = ?self.path, "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::os::unix::fs::PermissionsExt;

    fn sample_settings() -> ConnectionSettings {
        ConnectionSettings {
            registry_url: "tcp://us-west-1.hyper.sh:443".into(),
            access_id: "A".into(),
            secret_key: "S".into(),
            registry_email: "e@x.com".into(),
            registry_username: "bob".into(),
            registry_password: "pw".into(),
        }
    }

    #[test]
    fn registry_auth_requires_all_three_fields() {
        let full = sample_settings();
        let auth = full.registry_auth().expect("complete login");
        assert_eq!(auth.username, "bob");
        assert_eq!(auth.email, "e@x.com");

        let mut no_email = sample_settings();
        no_email.registry_email.clear();
        assert!(no_email.registry_auth().is_none());

        let mut no_user = sample_settings();
        no_user.registry_username.clear();
        assert!(no_user.registry_auth().is_none());

        let mut no_password = sample_settings();
        no_password.registry_password = StoredSecret::default();
        assert!(no_password.registry_auth().is_none());
    }

    #[test]
    fn validation_accepts_hyper_endpoints() {
        assert!(sample_settings().validate().is_ok());

        let mut https = sample_settings();
        https.registry_url = "https://x".into();
        assert!(https.validate().is_ok());
    }

    #[test]
    fn validation_rejects_injection_and_missing_fields() {
        for url in ["", "-H evil", "us-west-1.hyper.sh", "tcp://host name", "--host=tcp://x"] {
            let mut settings = sample_settings();
            settings.registry_url = url.into();
            assert!(
                matches!(settings.validate(), Err(AgentError::InvalidSettings(_))),
                "accepted {url:?}"
            );
        }

        let mut no_id = sample_settings();
        no_id.access_id.clear();
        assert!(no_id.validate().is_err());

        let mut no_key = sample_settings();
        no_key.secret_key = StoredSecret::default();
        assert!(no_key.validate().is_err());
    }

    #[test]
    fn debug_never_prints_secrets() {
        let printed = format!("{:?}", sample_settings());
        assert!(!printed.contains("\"S\""));
        assert!(!printed.contains("pw"));
    }

    #[test]
    fn persisted_record_uses_host_field_names() {
        let json = serde_json::to_value(PersistedSettings {
            connection: sample_settings(),
            updated_at: None,
        })
        .unwrap();
        assert_eq!(json["registryUrl"], "tcp://us-west-1.hyper.sh:443");
        assert_eq!(json["accessId"], "A");
        assert_eq!(json["secretKey"], "S");
        assert_eq!(json["registryPassword"], "pw");
        assert!(json.get("updatedAt").is_none());
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::new(dir.path().join("hyper-commons.json"));
        let loaded = store.load().await.unwrap();
        assert!(loaded.connection.registry_url.is_empty());
        assert!(loaded.updated_at.is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hyper-commons.json");
        let store = FileSettingsStore::new(path.clone());

        let record = PersistedSettings::touched(sample_settings());
        store.save(&record).await.unwrap();

        let mode = std_fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.connection.registry_url, "tcp://us-west-1.hyper.sh:443");
        assert_eq!(loaded.connection.secret_key.expose_secret(), "S");
        assert_eq!(loaded.connection.registry_password.expose_secret(), "pw");
        assert_eq!(loaded.updated_at, record.updated_at);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyper-commons.json");
        std_fs::write(&path, b"{not json").unwrap();

        let err = FileSettingsStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, AgentError::SettingsLoadFailed { .. }));
    }
}
