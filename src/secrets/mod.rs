//! Versioned secret management API.
//!
//! [`SecretManagerClient`] is the high level surface the `gcloud` store is built on:
//! containers are created once, payloads are appended as versions and reads always
//! return the latest version.

pub mod auth;
pub mod google;

use async_trait::async_trait;
use thiserror::Error;

pub use auth::{ServiceAccountTokens, StaticToken, TokenSource};
pub use google::GoogleSecrets;

#[async_trait]
pub trait SecretManagerClient: Send + Sync {
    /// Payload of the latest version of the named secret.
    async fn get_latest_version(&self, name: &str) -> Result<Vec<u8>, SecretsError>;

    /// Create the named secret container. An existing container is not an error.
    async fn create_secret(&self, name: &str) -> Result<(), SecretsError>;

    /// Append a new version holding `payload`. The container must already exist.
    async fn add_secret_version(&self, name: &str, payload: &[u8]) -> Result<(), SecretsError>;

    /// Delete the named secret and all of its versions. Irreversible.
    async fn delete_secret(&self, name: &str) -> Result<(), SecretsError>;
}

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secret not found")]
    NotFound,

    #[error("secret payload too large")]
    PayloadTooLarge,

    #[error("secret access denied")]
    PermissionDenied,

    #[error("secret manager deadline exceeded")]
    DeadlineExceeded,

    #[error("secret manager returned {code} {status}: {message}")]
    Api {
        code: u16,
        status: String,
        message: String,
    },

    #[error("secret manager request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("secret manager credentials: {0}")]
    Credentials(String),

    #[error("could not decode secret manager response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SecretsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SecretsError::DeadlineExceeded
        } else {
            SecretsError::Transport(err)
        }
    }
}
