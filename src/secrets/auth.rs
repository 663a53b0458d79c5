//! OAuth2 access tokens for the Google Secret Manager API.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::SecretsError;

/// Scope required for every Secret Manager call.
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Supplies bearer tokens for secret manager requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, SecretsError>;
}

/// A fixed token, for emulators and tests.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, SecretsError> {
        Ok(self.0.clone())
    }
}

type FetchToken = Box<dyn Fn() -> BoxFuture<'static, Result<String, SecretsError>> + Send + Sync>;

/// Tokens minted from a service account JSON key. The authenticator caches and
/// refreshes tokens internally.
pub struct ServiceAccountTokens {
    fetch: FetchToken,
}

impl ServiceAccountTokens {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SecretsError> {
        let path = path.as_ref();
        let key = yup_oauth2::read_service_account_key(path)
            .await
            .map_err(|e| {
                SecretsError::Credentials(format!(
                    "could not read service account key {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| {
                SecretsError::Credentials(format!("could not build authenticator: {}", e))
            })?;
        let auth = Arc::new(auth);

        let fetch: FetchToken = Box::new(move || {
            let auth = Arc::clone(&auth);
            Box::pin(async move {
                let token = auth
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| SecretsError::Credentials(e.to_string()))?;
                token
                    .token()
                    .map(str::to_owned)
                    .ok_or_else(|| SecretsError::Credentials("empty access token".into()))
            })
        });

        Ok(Self { fetch })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn token(&self) -> Result<String, SecretsError> {
        (self.fetch)().await
    }
}
