//! Google Secret Manager client over the v1 REST API.
//!
//! Endpoints used:
//! - `POST   v1/projects/{project}/secrets?secretId={name}`          create container
//! - `POST   v1/projects/{project}/secrets/{name}:addVersion`        append version
//! - `GET    v1/projects/{project}/secrets/{name}/versions/latest:access`
//! - `DELETE v1/projects/{project}/secrets/{name}`
//!
//! Failures come back as a Google status envelope, e.g.
//! `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{SecretManagerClient, SecretsError, TokenSource};

pub const DEFAULT_ENDPOINT: &str = "https://secretmanager.googleapis.com/";

/// Secret Manager client scoped to one project.
#[derive(Clone)]
pub struct GoogleSecrets {
    http: Client,
    endpoint: Url,
    parent: String,
    tokens: Arc<dyn TokenSource>,
}

impl GoogleSecrets {
    /// Client for the public Google endpoint.
    pub fn new(
        project: &str,
        tokens: Arc<dyn TokenSource>,
        timeout: Duration,
    ) -> Result<Self, SecretsError> {
        Self::with_endpoint(DEFAULT_ENDPOINT, project, tokens, timeout)
    }

    /// Client for an alternate endpoint (emulators, tests).
    pub fn with_endpoint(
        endpoint: &str,
        project: &str,
        tokens: Arc<dyn TokenSource>,
        timeout: Duration,
    ) -> Result<Self, SecretsError> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| SecretsError::Credentials(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            parent: format!("projects/{}", project),
            tokens,
        })
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    fn url(&self, path: &str) -> Result<Url, SecretsError> {
        self.endpoint
            .join(path)
            .map_err(|e| SecretsError::Decode(format!("invalid request path {}: {}", path, e)))
    }

    fn secret_path(&self, name: &str) -> String {
        format!("v1/{}/secrets/{}", self.parent, urlencoding::encode(name))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, SecretsError> {
        let token = self.tokens.token().await?;
        let rep = req.bearer_auth(token).send().await?;
        Ok(rep)
    }
}

#[async_trait]
impl SecretManagerClient for GoogleSecrets {
    async fn get_latest_version(&self, name: &str) -> Result<Vec<u8>, SecretsError> {
        let url = self.url(&format!("{}/versions/latest:access", self.secret_path(name)))?;
        let rep = self.send(self.http.get(url)).await?;

        if !rep.status().is_success() {
            return Err(match ApiFailure::read(rep).await {
                f if f.status == ApiStatus::NotFound => SecretsError::NotFound,
                f => f.into_error(),
            });
        }

        let body: AccessSecretVersionResponse = rep
            .json()
            .await
            .map_err(|e| SecretsError::Decode(e.to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(body.payload.data)
            .map_err(|e| SecretsError::Decode(format!("invalid payload encoding: {}", e)))
    }

    async fn create_secret(&self, name: &str) -> Result<(), SecretsError> {
        let url = self.url(&format!("v1/{}/secrets", self.parent))?;
        let req = self
            .http
            .post(url)
            .query(&[("secretId", name)])
            .json(&serde_json::json!({
                "replication": { "automatic": {} }
            }));

        // The secret response is discarded, nothing in it is needed.
        let rep = self.send(req).await?;
        if rep.status().is_success() {
            return Ok(());
        }

        // Secrets are versioned and reads take the latest version, so an existing
        // container is fine.
        match ApiFailure::read(rep).await {
            f if f.status == ApiStatus::AlreadyExists => Ok(()),
            f => Err(f.into_error()),
        }
    }

    async fn add_secret_version(&self, name: &str, payload: &[u8]) -> Result<(), SecretsError> {
        let url = self.url(&format!("{}:addVersion", self.secret_path(name)))?;
        let req = self.http.post(url).json(&serde_json::json!({
            "payload": {
                "data": base64::engine::general_purpose::STANDARD.encode(payload),
            }
        }));

        let rep = self.send(req).await?;
        if rep.status().is_success() {
            return Ok(());
        }

        let failure = ApiFailure::read(rep).await;
        Err(match failure.status {
            // The container was deleted or never created.
            ApiStatus::NotFound => SecretsError::NotFound,
            // Payloads over 64KiB are rejected as invalid arguments.
            ApiStatus::InvalidArgument => SecretsError::PayloadTooLarge,
            // A wrong project path shows up as permission denied.
            ApiStatus::PermissionDenied => SecretsError::PermissionDenied,
            _ => failure.into_error(),
        })
    }

    async fn delete_secret(&self, name: &str) -> Result<(), SecretsError> {
        let url = self.url(&self.secret_path(name))?;
        let rep = self.send(self.http.delete(url)).await?;
        if rep.status().is_success() {
            return Ok(());
        }

        Err(match ApiFailure::read(rep).await {
            f if f.status == ApiStatus::NotFound => SecretsError::NotFound,
            f => f.into_error(),
        })
    }
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GoogleStatus,
}

#[derive(Deserialize)]
struct GoogleStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiStatus {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    PermissionDenied,
    DeadlineExceeded,
    Other,
}

impl ApiStatus {
    fn classify(code: StatusCode, status: &str) -> Self {
        match status {
            "NOT_FOUND" => return ApiStatus::NotFound,
            "ALREADY_EXISTS" => return ApiStatus::AlreadyExists,
            "INVALID_ARGUMENT" => return ApiStatus::InvalidArgument,
            "PERMISSION_DENIED" => return ApiStatus::PermissionDenied,
            "DEADLINE_EXCEEDED" => return ApiStatus::DeadlineExceeded,
            _ => {}
        }

        match code {
            StatusCode::NOT_FOUND => ApiStatus::NotFound,
            StatusCode::CONFLICT => ApiStatus::AlreadyExists,
            StatusCode::BAD_REQUEST => ApiStatus::InvalidArgument,
            StatusCode::FORBIDDEN => ApiStatus::PermissionDenied,
            StatusCode::GATEWAY_TIMEOUT => ApiStatus::DeadlineExceeded,
            _ => ApiStatus::Other,
        }
    }
}

/// A non-2xx reply from the API.
struct ApiFailure {
    code: StatusCode,
    status: ApiStatus,
    status_name: String,
    message: String,
}

impl ApiFailure {
    async fn read(rep: Response) -> Self {
        let code = rep.status();
        let body = rep.bytes().await.unwrap_or_default();

        let (status_name, message) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(env) => (env.error.status, env.error.message),
            Err(_) => (
                String::new(),
                String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned(),
            ),
        };

        Self {
            code,
            status: ApiStatus::classify(code, &status_name),
            status_name,
            message,
        }
    }

    fn into_error(self) -> SecretsError {
        if self.status == ApiStatus::DeadlineExceeded {
            return SecretsError::DeadlineExceeded;
        }
        SecretsError::Api {
            code: self.code.as_u16(),
            status: self.status_name,
            message: self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticToken;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GoogleSecrets {
        GoogleSecrets::with_endpoint(
            &server.uri(),
            "project",
            Arc::new(StaticToken::new("test-token")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn google_error(code: u16, status: &str) -> ResponseTemplate {
        ResponseTemplate::new(code).set_body_json(serde_json::json!({
            "error": { "code": code, "message": "mock failure", "status": status }
        }))
    }

    #[tokio::test]
    async fn test_get_latest_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/project/secrets/pkcs12password-1234/versions/latest:access"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/project/secrets/pkcs12password-1234/versions/3",
                "payload": { "data": "aHVudGVyMg==" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let secret = client(&server)
            .get_latest_version("pkcs12password-1234")
            .await
            .unwrap();
        assert_eq!(secret, b"hunter2");
    }

    #[tokio::test]
    async fn test_get_latest_version_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(google_error(404, "NOT_FOUND"))
            .mount(&server)
            .await;

        let err = client(&server).get_latest_version("missing").await.unwrap_err();
        assert!(matches!(err, SecretsError::NotFound));
    }

    #[tokio::test]
    async fn test_get_latest_version_passes_other_errors_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(google_error(500, "INTERNAL"))
            .mount(&server)
            .await;

        let err = client(&server).get_latest_version("broken").await.unwrap_err();
        match err {
            SecretsError::Api { code, status, .. } => {
                assert_eq!(code, 500);
                assert_eq!(status, "INTERNAL");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/project/secrets"))
            .and(query_param("secretId", "certificate-1234"))
            .and(body_json(serde_json::json!({ "replication": { "automatic": {} } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/project/secrets/certificate-1234"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).create_secret("certificate-1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_secret_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(google_error(409, "ALREADY_EXISTS"))
            .mount(&server)
            .await;

        client(&server).create_secret("certificate-1234").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_secret_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/project/secrets/certificate-1234:addVersion"))
            .and(body_json(serde_json::json!({ "payload": { "data": "Y2VydA==" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/project/secrets/certificate-1234/versions/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .add_secret_version("certificate-1234", b"cert")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_secret_version_error_mapping() {
        let cases = [
            (404, "NOT_FOUND"),
            (400, "INVALID_ARGUMENT"),
            (403, "PERMISSION_DENIED"),
            (504, "DEADLINE_EXCEEDED"),
        ];

        for (code, status) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(google_error(code, status))
                .mount(&server)
                .await;

            let err = client(&server)
                .add_secret_version("certificate-1234", b"cert")
                .await
                .unwrap_err();
            let ok = match status {
                "NOT_FOUND" => matches!(err, SecretsError::NotFound),
                "INVALID_ARGUMENT" => matches!(err, SecretsError::PayloadTooLarge),
                "PERMISSION_DENIED" => matches!(err, SecretsError::PermissionDenied),
                _ => matches!(err, SecretsError::DeadlineExceeded),
            };
            assert!(ok, "{status} mapped to {err:?}");
        }
    }

    #[tokio::test]
    async fn test_status_code_fallback_without_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<html>not here</html>"))
            .mount(&server)
            .await;

        let err = client(&server).get_latest_version("missing").await.unwrap_err();
        assert!(matches!(err, SecretsError::NotFound));
    }

    #[tokio::test]
    async fn test_timeout_is_deadline_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = GoogleSecrets::with_endpoint(
            &server.uri(),
            "project",
            Arc::new(StaticToken::new("test-token")),
            Duration::from_millis(200),
        )
        .unwrap();

        let err = client.get_latest_version("slow").await.unwrap_err();
        assert!(matches!(err, SecretsError::DeadlineExceeded), "got {err:?}");
    }

    #[tokio::test]
    async fn test_delete_secret() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/projects/project/secrets/certificate-1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete_secret("certificate-1234").await.unwrap();
    }
}
