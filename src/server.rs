// src/server.rs

use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::sys::installer::HttpClientInstaller;
use crate::sys::secrets::StoredSecret;
use crate::sys::settings::{ConnectionSettings, FileSettingsStore, PersistedSettings};
use crate::sys::traits::{ClientInstaller, ConnectivityVerifier, SettingsStore, VerificationResult};
use crate::sys::verify::HyperConnectivityVerifier;

pub mod hyper_commons {
    tonic::include_proto!("hypercommons.agent.v1");
}

use hyper_commons::settings_agent_server::SettingsAgent;
use hyper_commons::{
    ActionResponse, DownloadClientRequest, GetSettingsRequest, SettingsRequest, SettingsView, Severity,
};

pub const MSG_SETTINGS_SAVED: &str = "settings saved";
pub const MSG_CLIENT_DOWNLOADED: &str = "Hypercli downloaded!";

fn construct_response(success: bool, message: impl Into<String>) -> Result<Response<ActionResponse>, Status> {
    Ok(Response::new(ActionResponse {
        success,
        severity: Severity::Ok as i32,
        message: message.into(),
    }))
}

fn construct_error_response(message: impl Into<String>) -> Result<Response<ActionResponse>, Status> {
    Ok(Response::new(ActionResponse {
        success: false,
        severity: Severity::Error as i32,
        message: message.into(),
    }))
}

impl From<SettingsRequest> for ConnectionSettings {
    fn from(req: SettingsRequest) -> Self {
        Self {
            registry_url: req.registry_url.trim().to_string(),
            access_id: req.access_id.trim().to_string(),
            secret_key: StoredSecret::new(req.secret_key),
            registry_email: req.registry_email.trim().to_string(),
            registry_username: req.registry_username.trim().to_string(),
            registry_password: StoredSecret::new(req.registry_password),
        }
    }
}

/// Secrets never travel back to the settings page, so a form submitted with
/// empty secret fields means "keep what is stored".
///
/// The stored secret key only follows the same endpoint and access id, and the
/// registry password only follows the same login on top of that. Pointing the
/// form anywhere else needs the secrets typed in again, otherwise the saved key
/// would be handed to whatever host the form names.
fn inherit_secrets(mut submitted: ConnectionSettings, stored: &ConnectionSettings) -> ConnectionSettings {
    let same_endpoint = submitted.registry_url == stored.registry_url && submitted.access_id == stored.access_id;
    if !same_endpoint {
        return submitted;
    }

    if submitted.secret_key.is_empty() {
        submitted.secret_key = stored.secret_key.clone();
    }
    if submitted.registry_password.is_empty() && submitted.registry_username == stored.registry_username {
        submitted.registry_password = stored.registry_password.clone();
    }
    submitted
}

pub struct HyperCommonsService {
    config: AgentConfig,
    settings: RwLock<PersistedSettings>,
    store: Box<dyn SettingsStore>,
    verifier: Box<dyn ConnectivityVerifier>,
    installer: Box<dyn ClientInstaller>,
}

impl HyperCommonsService {
    /// Wires the concrete managers and loads the persisted settings once.
    pub async fn load(config: AgentConfig) -> Result<Self, AgentError> {
        let store = FileSettingsStore::new(config.settings_path());
        let persisted = store.load().await?;
        if !persisted.connection.registry_url.is_empty() {
            info!(endpoint = %persisted.connection.registry_url, "loaded persisted settings");
        }

        Ok(Self {
            settings: RwLock::new(persisted),
            store: Box::new(store),
            verifier: Box::new(HyperConnectivityVerifier::new(
                config.client_binary_path(),
                config.tmp_root.clone(),
                config.verify_timeout,
            )),
            installer: Box::new(HttpClientInstaller::new(config.client_url.clone())?),
            config,
        })
    }

    /// Request fields, or the persisted settings when the request is blank.
    async fn resolve_settings(&self, req: SettingsRequest) -> ConnectionSettings {
        let stored = self.settings.read().await;
        if req.registry_url.trim().is_empty() && req.access_id.trim().is_empty() {
            return stored.connection.clone();
        }
        inherit_secrets(req.into(), &stored.connection)
    }
}

#[tonic::async_trait]
impl SettingsAgent for HyperCommonsService {
    async fn configure_settings(
        &self,
        request: Request<SettingsRequest>,
    ) -> Result<Response<ActionResponse>, Status> {
        let req = request.into_inner();

        let mut current = self.settings.write().await;
        let submitted = inherit_secrets(req.into(), &current.connection);
        if let Err(e) = submitted.validate() {
            return construct_error_response(e.to_string());
        }

        let record = PersistedSettings::touched(submitted);
        if let Err(e) = self.store.save(&record).await {
            warn!(error = %e, "settings not persisted");
            return construct_error_response(e.to_string());
        }

        info!(endpoint = %record.connection.registry_url, "settings updated");
        *current = record;
        construct_response(true, MSG_SETTINGS_SAVED)
    }

    async fn get_settings(
        &self,
        _request: Request<GetSettingsRequest>,
    ) -> Result<Response<SettingsView>, Status> {
        let current = self.settings.read().await;
        let connection = &current.connection;

        Ok(Response::new(SettingsView {
            registry_url: connection.registry_url.clone(),
            access_id: connection.access_id.clone(),
            secret_key_set: !connection.secret_key.is_empty(),
            registry_email: connection.registry_email.clone(),
            registry_username: connection.registry_username.clone(),
            registry_password_set: !connection.registry_password.is_empty(),
            updated_at: current.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        }))
    }

    async fn test_connection(
        &self,
        request: Request<SettingsRequest>,
    ) -> Result<Response<ActionResponse>, Status> {
        let settings = self.resolve_settings(request.into_inner()).await;
        if let Err(e) = settings.validate() {
            return construct_error_response(VerificationResult::Error(e.to_string()).message());
        }

        let result = self.verifier.verify(settings).await;
        match result {
            VerificationResult::Error(_) => construct_error_response(result.message()),
            _ => construct_response(result.is_success(), result.message()),
        }
    }

    async fn download_client(
        &self,
        _request: Request<DownloadClientRequest>,
    ) -> Result<Response<ActionResponse>, Status> {
        match self.installer.install(&self.config.data_dir).await {
            Ok(_) => construct_response(true, MSG_CLIENT_DOWNLOADED),
            Err(e) => {
                warn!(error = %e, "hyper client download failed");
                construct_error_response(format!("Downloading Hypercli error: {}", e))
            }
        }
    }
}
