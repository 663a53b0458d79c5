//! GcloudStore: secrets as versioned entries in Google Secret Manager.
//!
//! Every update appends a new version to the secret named by the storage key,
//! creating the secret container on first use. Reads return the latest version.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{storage_key, SecretKind, Store, StoreError};
use crate::config::GcpSecretsConfig;
use crate::secrets::{GoogleSecrets, SecretManagerClient, SecretsError, ServiceAccountTokens};

pub struct GcloudStore {
    client: Arc<dyn SecretManagerClient>,
}

impl GcloudStore {
    /// Connect to Secret Manager with the configured service account credentials.
    pub async fn open(conf: &GcpSecretsConfig) -> Result<Self, StoreError> {
        let credentials = conf
            .credentials
            .as_ref()
            .ok_or_else(|| StoreError::Other("missing credentials for secret manager storage".into()))?;
        let project = conf
            .project
            .as_deref()
            .ok_or_else(|| StoreError::Other("missing project name for secret manager storage".into()))?;

        let tokens = ServiceAccountTokens::from_file(credentials).await?;
        let client = GoogleSecrets::new(
            project,
            Arc::new(tokens),
            Duration::from_secs(conf.timeout),
        )?;

        tracing::info!(project = %project, "GcloudStore: connected to secret manager");
        Ok(Self::with_client(Arc::new(client)))
    }

    pub fn with_client(client: Arc<dyn SecretManagerClient>) -> Self {
        Self { client }
    }

    /// Delete a secret and all of its versions. Not exposed through the webhook API.
    pub async fn delete(&self, kind: SecretKind, id: &str) -> Result<(), StoreError> {
        let name = storage_key(kind, id)?;
        self.client.delete_secret(&name).await.map_err(not_found)?;
        tracing::debug!(kind = ?kind, id = %id, "GcloudStore: secret deleted");
        Ok(())
    }

    async fn latest(&self, kind: SecretKind, id: &str) -> Result<Vec<u8>, StoreError> {
        let name = storage_key(kind, id)?;
        self.client.get_latest_version(&name).await.map_err(not_found)
    }

    async fn append(&self, kind: SecretKind, id: &str, payload: &[u8]) -> Result<(), StoreError> {
        let name = storage_key(kind, id)?;

        // Container creation tolerates an existing secret, so this is safe on every update.
        self.client.create_secret(&name).await.map_err(not_found)?;
        self.client
            .add_secret_version(&name, payload)
            .await
            .map_err(not_found)?;

        tracing::debug!(kind = ?kind, id = %id, "GcloudStore: secret version added");
        Ok(())
    }
}

#[async_trait]
impl Store for GcloudStore {
    async fn get_password(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.latest(SecretKind::Password, id).await
    }

    async fn update_password(&self, id: &str, password: &[u8]) -> Result<(), StoreError> {
        self.append(SecretKind::Password, id, password).await
    }

    async fn get_certificate(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.latest(SecretKind::Certificate, id).await
    }

    async fn update_certificate(&self, id: &str, cert: &[u8]) -> Result<(), StoreError> {
        self.append(SecretKind::Certificate, id, cert).await
    }

    // The REST client holds no connections that need an explicit release.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn not_found(err: SecretsError) -> StoreError {
    match err {
        SecretsError::NotFound => StoreError::NotFound,
        other => StoreError::Secrets(other),
    }
}
