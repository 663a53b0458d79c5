//! Courier: certificate delivery webhook service and API client.
//!
//! The library crate backs both the `courier` binary and the integration tests in `tests/`.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod secrets;
pub mod server;
pub mod store;
pub mod trust;
pub mod version;
