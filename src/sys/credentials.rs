// src/sys/credentials.rs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs as std_fs;
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::AgentError;
use crate::sys::cleanup;
use crate::sys::settings::ConnectionSettings;

/// Docker Hub index the registry login is recorded against.
pub const REGISTRY_INDEX_URL: &str = "https://index.docker.io/v1/";
/// Every credential directory is named `<prefix>-<agent pid>-<random>`; the
/// stale sweep relies on both parts.
pub const CONFIG_DIR_PREFIX: &str = "hyper-commons-plugin";
pub const CONFIG_FILE_NAME: &str = "config.json";

// ==============================================================================
// 1. Document Shape (what `hyper --config` reads)
// ==============================================================================

#[derive(Serialize)]
struct CredentialDocument<'a> {
    auths: BTreeMap<&'static str, AuthEntry<'a>>,
    clouds: BTreeMap<&'a str, CloudEntry<'a>>,
}

#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
struct AuthEntry<'a> {
    auth: String,
    #[zeroize(skip)]
    email: &'a str,
}

#[derive(Serialize)]
struct CloudEntry<'a> {
    accesskey: &'a str,
    secretkey: &'a str,
}

/// Serializes `settings` into the client's config document.
///
/// Everything borrowed from `settings` stays borrowed; the only owned copies of
/// secret material (the base64 login and the output buffer) are zeroized on drop.
pub fn render_config(settings: &ConnectionSettings) -> Result<Zeroizing<Vec<u8>>, AgentError> {
    let mut auths = BTreeMap::new();
    if let Some(login) = settings.registry_auth() {
        let auth = login.password.use_secret(|password| {
            let pair = Zeroizing::new(format!("{}:{}", login.username, password));
            STANDARD.encode(pair.as_bytes())
        });
        auths.insert(REGISTRY_INDEX_URL, AuthEntry { auth, email: login.email });
    }

    let mut clouds = BTreeMap::new();
    clouds.insert(
        settings.registry_url.as_str(),
        CloudEntry {
            accesskey: &settings.access_id,
            secretkey: settings.secret_key.expose_secret(),
        },
    );

    let document = CredentialDocument { auths, clouds };
    Ok(Zeroizing::new(serde_json::to_vec(&document)?))
}

// ==============================================================================
// 2. Materialization
// ==============================================================================

/// A credential directory on disk. It is not removed on drop: the verifier
/// decides when, and needs to know whether the removal succeeded.
#[derive(Debug)]
pub struct MaterializedConfig {
    dir: PathBuf,
    file: PathBuf,
}

impl MaterializedConfig {
    /// The directory handed to `hyper --config`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Deletes the config file and then its directory. True only if both
    /// existed and both are gone now.
    pub async fn cleanup(&self) -> bool {
        cleanup::remove_materialized(&self.file, &self.dir).await
    }
}

/// Writes `settings` to `<tmp_root>/hyper-commons-plugin-<pid>-XXXXXX/config.json`.
///
/// The directory is unique to this call (0700) and the file is created 0600, so
/// two verifications never share a path and no other local user can read it.
pub async fn materialize(settings: &ConnectionSettings, tmp_root: &Path) -> Result<MaterializedConfig, AgentError> {
    let document = render_config(settings)?;

    fs::create_dir_all(tmp_root)
        .await
        .map_err(|source| AgentError::DirectoryCreateFailed {
            path: tmp_root.to_path_buf(),
            source,
        })?;

    let dir = create_private_dir(tmp_root.to_path_buf())
        .await
        .map_err(|source| AgentError::DirectoryCreateFailed {
            path: tmp_root.to_path_buf(),
            source,
        })?;

    let materialized = MaterializedConfig {
        file: dir.join(CONFIG_FILE_NAME),
        dir,
    };

    let mut opts = std_fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true).mode(0o600);

    let mut file = match fs::OpenOptions::from(opts).open(&materialized.file).await {
        Ok(file) => file,
        Err(source) => {
            let _ = fs::remove_dir_all(&materialized.dir).await;
            return Err(AgentError::FileCreateFailed {
                path: materialized.file.clone(),
                source,
            });
        }
    };

    let write_result = async {
        file.write_all(&document).await?;
        file.sync_all().await
    }
    .await;

    if let Err(source) = write_result {
        // Never leave a half-written credential file behind.
        drop(file);
        let _ = fs::remove_dir_all(&materialized.dir).await;
        return Err(AgentError::WriteFailed {
            path: materialized.file.clone(),
            source,
        });
    }

    debug!(dir = ?materialized.dir, "credentials materialized");
    Ok(materialized)
}

/// `mkdir` of a fresh `0o700` directory tagged with this process id.
/// `tempfile` is blocking, so it runs on the blocking pool.
async fn create_private_dir(tmp_root: PathBuf) -> io::Result<PathBuf> {
    let prefix = format!("{}-{}-", CONFIG_DIR_PREFIX, std::process::id());
    task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix(&prefix)
            .permissions(std_fs::Permissions::from_mode(0o700))
            .tempdir_in(&tmp_root)
            .map(TempDir::keep)
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::secrets::StoredSecret;
    use serde_json::{Value, json};

    fn cloud_only() -> ConnectionSettings {
        ConnectionSettings {
            registry_url: "https://x".into(),
            access_id: "A".into(),
            secret_key: "S".into(),
            ..Default::default()
        }
    }

    fn with_registry() -> ConnectionSettings {
        ConnectionSettings {
            registry_email: "e@x.com".into(),
            registry_username: "bob".into(),
            registry_password: "pw".into(),
            ..cloud_only()
        }
    }

    fn rendered(settings: &ConnectionSettings) -> Value {
        serde_json::from_slice(&render_config(settings).unwrap()).unwrap()
    }

    #[test]
    fn cloud_only_settings_render_empty_auths() {
        assert_eq!(
            rendered(&cloud_only()),
            json!({
                "auths": {},
                "clouds": {"https://x": {"accesskey": "A", "secretkey": "S"}}
            })
        );
    }

    #[test]
    fn full_settings_render_one_registry_login() {
        let doc = rendered(&with_registry());
        let auths = doc["auths"].as_object().unwrap();
        assert_eq!(auths.len(), 1);

        let entry = &auths[REGISTRY_INDEX_URL];
        assert_eq!(entry["auth"], STANDARD.encode("bob:pw"));
        assert_eq!(entry["auth"], "Ym9iOnB3");
        assert_eq!(entry["email"], "e@x.com");

        let clouds = doc["clouds"].as_object().unwrap();
        assert_eq!(clouds.len(), 1);
        assert_eq!(clouds["https://x"], json!({"accesskey": "A", "secretkey": "S"}));
    }

    #[test]
    fn any_missing_registry_field_drops_the_login() {
        let mut no_email = with_registry();
        no_email.registry_email.clear();
        let mut no_user = with_registry();
        no_user.registry_username.clear();
        let mut no_password = with_registry();
        no_password.registry_password = StoredSecret::default();

        for settings in [no_email, no_user, no_password] {
            assert_eq!(rendered(&settings)["auths"], json!({}));
        }
    }

    #[test]
    fn hostile_values_stay_inside_their_strings() {
        let settings = ConnectionSettings {
            registry_url: "tcp://h\"}, \"evil\": {\"x".into(),
            access_id: "a\\b\n".into(),
            secret_key: "s\"e\u{1}c".into(),
            registry_email: "\"@x".into(),
            registry_username: "u".into(),
            registry_password: "p:\"w".into(),
        };
        let doc = rendered(&settings);

        let clouds = doc["clouds"].as_object().unwrap();
        assert_eq!(clouds.len(), 1);
        let cloud = &clouds["tcp://h\"}, \"evil\": {\"x"];
        assert_eq!(cloud["accesskey"], "a\\b\n");
        assert_eq!(cloud["secretkey"], "s\"e\u{1}c");
        assert_eq!(doc["auths"][REGISTRY_INDEX_URL]["email"], "\"@x");
        assert_eq!(doc["auths"][REGISTRY_INDEX_URL]["auth"], STANDARD.encode("u:p:\"w"));
        assert_eq!(doc.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn materialize_writes_a_private_config_under_a_unique_dir() {
        let root = tempfile::tempdir().unwrap();
        let first = materialize(&with_registry(), root.path()).await.unwrap();
        let second = materialize(&with_registry(), root.path()).await.unwrap();

        assert_ne!(first.dir(), second.dir());
        assert_eq!(first.dir().parent().unwrap(), root.path());
        assert!(
            first
                .dir()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&format!("hyper-commons-plugin-{}-", std::process::id()))
        );
        assert_eq!(first.file(), first.dir().join("config.json"));

        let written: Value = serde_json::from_slice(&std_fs::read(first.file()).unwrap()).unwrap();
        assert_eq!(written, rendered(&with_registry()));

        let file_mode = std_fs::metadata(first.file()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        let dir_mode = std_fs::metadata(first.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        assert!(first.cleanup().await);
        assert!(second.cleanup().await);
    }

    #[tokio::test]
    async fn credential_dir_is_private_inside_a_shared_root() {
        let root = tempfile::tempdir().unwrap();
        // World-readable parent, as /tmp is.
        std_fs::set_permissions(root.path(), std_fs::Permissions::from_mode(0o777)).unwrap();

        let materialized = materialize(&cloud_only(), root.path()).await.unwrap();
        let dir_mode = std_fs::metadata(materialized.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o077, 0, "credential dir is {:o}", dir_mode & 0o777);
        assert!(materialized.cleanup().await);
    }

    #[tokio::test]
    async fn materialize_creates_a_missing_tmp_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let materialized = materialize(&cloud_only(), &nested).await.unwrap();
        assert!(materialized.file().is_file());
        assert!(materialized.cleanup().await);
    }

    #[tokio::test]
    async fn materialize_reports_an_unusable_tmp_root() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        std_fs::write(&blocker, b"").unwrap();

        let err = materialize(&cloud_only(), &blocker).await.unwrap_err();
        assert!(matches!(err, AgentError::DirectoryCreateFailed { .. }));
    }

    #[tokio::test]
    async fn cleanup_removes_file_and_dir_once() {
        let root = tempfile::tempdir().unwrap();
        let materialized = materialize(&cloud_only(), root.path()).await.unwrap();

        assert!(materialized.cleanup().await);
        assert!(!materialized.file().exists());
        assert!(!materialized.dir().exists());

        assert!(!materialized.cleanup().await);
    }
}
