//! Certificate delivery webhooks.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use zeroize::Zeroizing;

use crate::errors::AppError;
use crate::middleware::metrics;
use crate::models::{StoreCertificateRequest, StorePasswordRequest};
use crate::server::AppState;
use crate::trust;

/// `POST /v1/certs/:id`
///
/// Decodes the base64 certificate, decrypts it with the PKCS12 password stored for
/// the same id and stores the decrypted PEM. With `no_decrypt` the decoded bytes are
/// stored as received.
pub async fn store_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<StoreCertificateRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(mut req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.id = id;

    if req.base64_certificate.is_empty() {
        return Err(AppError::BadRequest("missing certificate in request".into()));
    }

    let mut data = base64::engine::general_purpose::STANDARD
        .decode(&req.base64_certificate)
        .map_err(|e| AppError::BadRequest(format!("could not decode certificate: {}", e)))?;

    let store = state.store()?;

    if !req.no_decrypt {
        let password = match store.get_password(&req.id).await {
            Ok(password) => Zeroizing::new(password),
            Err(e) if e.is_not_found() => {
                return Err(AppError::NotFound(
                    "pkcs12 password not found, unable to decrypt certificate".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        // Wrong passwords and corrupt containers get the same answer.
        let provider = trust::decrypt(&data, &password).map_err(|e| {
            tracing::debug!(id = %req.id, error = %e, "could not decrypt certificate");
            AppError::Conflict("failed to decrypt certificate with stored pkcs12 password".into())
        })?;

        data = provider.encode();
    }

    store.update_certificate(&req.id, &data).await?;

    metrics::record_certificate();
    tracing::info!(id = %req.id, decrypted = !req.no_decrypt, "certificate stored");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/certs/:id/pkcs12password`
pub async fn store_certificate_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<StorePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(mut req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.id = id;

    if req.password.is_empty() {
        return Err(AppError::BadRequest("missing password in request".into()));
    }

    let password = Zeroizing::new(std::mem::take(&mut req.password));
    state
        .store()?
        .update_password(&req.id, password.as_bytes())
        .await?;

    metrics::record_password();
    tracing::info!(id = %req.id, "pkcs12 password stored");
    Ok(StatusCode::NO_CONTENT)
}
