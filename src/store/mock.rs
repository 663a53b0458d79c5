//! Configurable in-process Store for handler and server tests.
//!
//! Each operation is answered by a callback installed with the matching `on_*`
//! setter; operations without a callback fail with `StoreError::Other`. Calls are
//! counted per operation so tests can assert what the handlers did.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Store, StoreError};

type GetFn = Box<dyn Fn(&str) -> Result<Vec<u8>, StoreError> + Send + Sync>;
type UpdateFn = Box<dyn Fn(&str, &[u8]) -> Result<(), StoreError> + Send + Sync>;
type CloseFn = Box<dyn Fn() -> Result<(), StoreError> + Send + Sync>;

pub const GET_PASSWORD: &str = "get_password";
pub const UPDATE_PASSWORD: &str = "update_password";
pub const GET_CERTIFICATE: &str = "get_certificate";
pub const UPDATE_CERTIFICATE: &str = "update_certificate";
pub const CLOSE: &str = "close";

#[derive(Default)]
pub struct MockStore {
    get_password: Mutex<Option<GetFn>>,
    update_password: Mutex<Option<UpdateFn>>,
    get_certificate: Mutex<Option<GetFn>>,
    update_certificate: Mutex<Option<UpdateFn>>,
    close: Mutex<Option<CloseFn>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get_password<F>(&self, f: F)
    where
        F: Fn(&str) -> Result<Vec<u8>, StoreError> + Send + Sync + 'static,
    {
        *guard(&self.get_password) = Some(Box::new(f));
    }

    pub fn on_update_password<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) -> Result<(), StoreError> + Send + Sync + 'static,
    {
        *guard(&self.update_password) = Some(Box::new(f));
    }

    pub fn on_get_certificate<F>(&self, f: F)
    where
        F: Fn(&str) -> Result<Vec<u8>, StoreError> + Send + Sync + 'static,
    {
        *guard(&self.get_certificate) = Some(Box::new(f));
    }

    pub fn on_update_certificate<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) -> Result<(), StoreError> + Send + Sync + 'static,
    {
        *guard(&self.update_certificate) = Some(Box::new(f));
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() -> Result<(), StoreError> + Send + Sync + 'static,
    {
        *guard(&self.close) = Some(Box::new(f));
    }

    /// Number of times the named operation was invoked.
    pub fn calls(&self, op: &str) -> usize {
        guard(&self.calls).get(op).copied().unwrap_or(0)
    }

    /// Remove all callbacks and call counts.
    pub fn reset(&self) {
        *guard(&self.get_password) = None;
        *guard(&self.update_password) = None;
        *guard(&self.get_certificate) = None;
        *guard(&self.update_certificate) = None;
        *guard(&self.close) = None;
        guard(&self.calls).clear();
    }

    fn record(&self, op: &'static str) {
        *guard(&self.calls).entry(op).or_insert(0) += 1;
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get_password(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.record(GET_PASSWORD);
        match guard(&self.get_password).as_ref() {
            Some(f) => f(id),
            None => Err(unconfigured(GET_PASSWORD)),
        }
    }

    async fn update_password(&self, id: &str, password: &[u8]) -> Result<(), StoreError> {
        self.record(UPDATE_PASSWORD);
        match guard(&self.update_password).as_ref() {
            Some(f) => f(id, password),
            None => Err(unconfigured(UPDATE_PASSWORD)),
        }
    }

    async fn get_certificate(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.record(GET_CERTIFICATE);
        match guard(&self.get_certificate).as_ref() {
            Some(f) => f(id),
            None => Err(unconfigured(GET_CERTIFICATE)),
        }
    }

    async fn update_certificate(&self, id: &str, cert: &[u8]) -> Result<(), StoreError> {
        self.record(UPDATE_CERTIFICATE);
        match guard(&self.update_certificate).as_ref() {
            Some(f) => f(id, cert),
            None => Err(unconfigured(UPDATE_CERTIFICATE)),
        }
    }

    // Unlike the other operations an unconfigured close succeeds, so servers built
    // around a mock can always shut down cleanly.
    async fn close(&self) -> Result<(), StoreError> {
        self.record(CLOSE);
        match guard(&self.close).as_ref() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

fn unconfigured(op: &str) -> StoreError {
    StoreError::Other(format!("mock {} not configured", op))
}

// A panicking callback poisons its mutex; the data is still usable.
fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
