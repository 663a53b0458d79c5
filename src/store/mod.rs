pub mod gcloud;
pub mod local;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::secrets::SecretsError;

/// Abstraction over certificate and password storage backends.
/// Implementations: LocalStore (zstd archives on disk), GcloudStore (Google Secret Manager).
///
/// Updates have create-or-overwrite semantics; reads of an id that was never
/// written fail with [`StoreError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Retrieve the PKCS12 password stored for a certificate id.
    async fn get_password(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite the PKCS12 password for a certificate id.
    async fn update_password(&self, id: &str, password: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a stored certificate by id.
    async fn get_certificate(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite the certificate for an id.
    async fn update_certificate(&self, id: &str, cert: &[u8]) -> Result<(), StoreError>;

    /// Release backend resources. Called once during graceful shutdown.
    async fn close(&self) -> Result<(), StoreError>;
}

/// The kind of secret being stored, which determines its storage namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    Password,
    Certificate,
}

impl SecretKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            SecretKind::Password => "pkcs12password",
            SecretKind::Certificate => "certificate",
        }
    }
}

/// Derive the storage key for a secret: `<kind-prefix>-<id>`.
///
/// The prefixes differ per kind so a password and a certificate with the same id
/// never collide.
pub fn storage_key(kind: SecretKind, id: &str) -> Result<String, StoreError> {
    if id.is_empty() {
        return Err(StoreError::MissingId);
    }
    Ok(format!("{}-{}", kind.prefix(), id))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("missing secret id")]
    MissingId,

    #[error("secret manager error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
