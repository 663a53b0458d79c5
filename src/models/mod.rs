//! Wire types shared by the server handlers and the API client.

pub mod api;

pub use api::{Reply, StatusReply, StoreCertificateRequest, StorePasswordRequest};
