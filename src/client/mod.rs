//! HTTP client for the courier API with retries and backoff.
//!
//! Every call takes a [`CancellationToken`]; cancelling it aborts the in-flight
//! attempt or backoff wait and stops further retries.

pub mod backoff;
pub mod errors;

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::models::{Reply, StatusReply, StoreCertificateRequest, StorePasswordRequest};

pub use backoff::{Backoff, BackoffFactory};
pub use errors::{join_status_errors, ClientError, MultiStatusError, StatusError};

pub const USER_AGENT: &str = "Courier API Client/v1";
pub const ACCEPT: &str = "application/json";
pub const ACCEPT_LANGUAGE: &str = "en-US,en";
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub const DEFAULT_RETRIES: usize = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait CourierClient: Send + Sync {
    /// Service status. A 503 is not an error: the reply says whether the service is
    /// in maintenance or stopping.
    async fn status(&self, cancel: &CancellationToken) -> Result<StatusReply, ClientError>;

    async fn store_certificate(
        &self,
        req: &StoreCertificateRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError>;

    async fn store_certificate_password(
        &self,
        req: &StorePasswordRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError>;
}

/// Client for the v1 courier API.
#[derive(Clone)]
pub struct ApiV1 {
    endpoint: Url,
    http: reqwest::Client,
    retries: usize,
    backoff: BackoffFactory,
}

impl std::fmt::Debug for ApiV1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiV1")
            .field("endpoint", &self.endpoint.as_str())
            .field("retries", &self.retries)
            .finish()
    }
}

impl ApiV1 {
    /// Client with exponential backoff and three retries.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        if endpoint.is_empty() {
            return Err(ClientError::EndpointRequired);
        }

        let endpoint = Url::parse(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            http,
            retries: DEFAULT_RETRIES,
            backoff: backoff::exponential(),
        })
    }

    /// Number of retries after the first attempt. Zero sends exactly one request.
    pub fn with_retries(mut self, retries: i64) -> Result<Self, ClientError> {
        self.retries = usize::try_from(retries).map_err(|_| ClientError::InvalidRetries)?;
        Ok(self)
    }

    pub fn with_backoff(mut self, backoff: BackoffFactory) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry immediately without delay.
    pub fn with_zero_backoff(self) -> Self {
        self.with_backoff(backoff::zero())
    }

    /// Replace the transport, e.g. to configure TLS. The courier headers are still
    /// set on every request.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Build a request for `path` resolved against the endpoint, JSON encoding `data`.
    pub fn new_request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        data: Option<&T>,
    ) -> Result<RequestBuilder, ClientError> {
        let url = self.endpoint.join(path)?;
        let mut req = self.http.request(method, url).headers(default_headers());

        if let Some(data) = data {
            let body = serde_json::to_vec(data).map_err(ClientError::Encode)?;
            req = req.body(body);
        }
        Ok(req)
    }

    /// Send a request and classify the response.
    ///
    /// With `check_status` any non-2xx status is an error, carrying the message of the
    /// error envelope when the server sent one. 2xx bodies other than 204 are decoded
    /// into `T` only if the content type is exactly [`CONTENT_TYPE`].
    pub async fn do_request<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        check_status: bool,
    ) -> Result<(StatusCode, Option<T>), ClientError> {
        let rep = req.send().await?;
        let status = rep.status();

        if check_status && !status.is_success() {
            return Err(status_error(rep).await.into());
        }

        if !status.is_success() || status == StatusCode::NO_CONTENT {
            return Ok((status, None));
        }

        Ok((status, Some(decode(rep).await?)))
    }

    /// Send a request that has no decode target. With `check_status` non-2xx
    /// statuses are errors; any 2xx body is discarded whatever its content type.
    pub async fn do_request_empty(
        &self,
        req: RequestBuilder,
        check_status: bool,
    ) -> Result<StatusCode, ClientError> {
        let rep = req.send().await?;
        let status = rep.status();

        if check_status && !status.is_success() {
            return Err(status_error(rep).await.into());
        }
        Ok(status)
    }

    /// Run `attempt` until it succeeds, retries run out, the backoff stops or
    /// `cancel` fires. Errors from the failed attempts are deduplicated and joined.
    async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        attempt: F,
    ) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let start = Instant::now();
        let mut backoff = (self.backoff)();
        let mut errs = Vec::new();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ClientError::Cancelled),
                res = attempt() => res,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(ClientError::Cancelled) => {
                    errs.push(ClientError::Cancelled);
                    break;
                }
                Err(e) => {
                    tracing::debug!(attempt = attempts, error = %e, "courier request failed");
                    errs.push(e);
                }
            }

            if attempts > self.retries {
                break;
            }

            let Some(delay) = backoff.next_backoff() else {
                break;
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    errs.push(ClientError::Cancelled);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Every exit from the loop records at least one error.
        Err(join_status_errors(attempts, start.elapsed(), errs).unwrap_or(ClientError::Cancelled))
    }
}

#[async_trait]
impl CourierClient for ApiV1 {
    async fn status(&self, cancel: &CancellationToken) -> Result<StatusReply, ClientError> {
        self.execute(cancel, move || async move {
            let req = self.new_request::<()>(Method::GET, "/v1/status", None)?;
            let rep = req.send().await?;

            let status = rep.status();
            if status != StatusCode::OK && status != StatusCode::SERVICE_UNAVAILABLE {
                return Err(StatusError::new(status.as_u16(), "").into());
            }
            decode(rep).await
        })
        .await
    }

    async fn store_certificate(
        &self,
        req: &StoreCertificateRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        if req.id.is_empty() {
            return Err(ClientError::IdRequired);
        }

        let path = format!("/v1/certs/{}", urlencoding::encode(&req.id));
        let path = path.as_str();
        self.execute(cancel, move || async move {
            let builder = self.new_request(Method::POST, path, Some(req))?;
            self.do_request_empty(builder, true).await.map(|_| ())
        })
        .await
    }

    async fn store_certificate_password(
        &self,
        req: &StorePasswordRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        if req.id.is_empty() {
            return Err(ClientError::IdRequired);
        }

        let path = format!("/v1/certs/{}/pkcs12password", urlencoding::encode(&req.id));
        let path = path.as_str();
        self.execute(cancel, move || async move {
            let builder = self.new_request(Method::POST, path, Some(req))?;
            self.do_request_empty(builder, true).await.map(|_| ())
        })
        .await
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE));
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODING));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    headers
}

/// Status error from a non-2xx response, preferring the envelope's message.
async fn status_error(rep: Response) -> StatusError {
    let code = rep.status().as_u16();
    let message = match rep.json::<Reply>().await {
        Ok(reply) => reply.error,
        Err(_) => String::new(),
    };
    StatusError::new(code, message)
}

async fn decode<T: DeserializeOwned>(rep: Response) -> Result<T, ClientError> {
    let content_type = rep
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if content_type != CONTENT_TYPE {
        return Err(ClientError::UnexpectedContentType(content_type));
    }

    let body = rep.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}
