use serde::{Deserialize, Serialize};

pub const STATUS_OK: &str = "ok";
pub const STATUS_MAINTENANCE: &str = "maintenance";
pub const STATUS_STOPPING: &str = "stopping";

/// Generic response envelope. Errors are rendered as `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uptime: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Body of `POST /v1/certs/:id`. The id travels in the path, not the body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreCertificateRequest {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub no_decrypt: bool,
    #[serde(default)]
    pub base64_certificate: String,
}

/// Body of `POST /v1/certs/:id/pkcs12password`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StorePasswordRequest {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub password: String,
}

// Keep passwords out of debug logs.
impl std::fmt::Debug for StorePasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePasswordRequest")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}
