//! LocalStore: secrets as compressed single-payload archives on disk.
//!
//! Each secret lives in its own file under the configured root directory:
//!
//! ```text
//! <root>/pkcs12password-<id>.zst
//! <root>/certificate-<id>.zst
//! ```
//!
//! Every file is one zstd frame holding the raw payload. Writes are built fully in
//! memory and handed to the object store, which stages them in a temporary file
//! and renames it over the target, so readers never see a partial archive.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{local::LocalFileSystem, path::Path, ObjectStore};
use tokio::sync::RwLock;

use super::{storage_key, SecretKind, Store, StoreError};
use crate::config::LocalStorageConfig;

/// File extension of every archive written by the local backend.
const ARCHIVE_EXT: &str = "zst";

/// zstd compression level for archives.
const COMPRESSION_LEVEL: i32 = 3;

pub struct LocalStore {
    fs: Arc<dyn ObjectStore>,
    root: std::path::PathBuf,
    // Reads share the lock, writes take it exclusively.
    lock: RwLock<()>,
}

impl LocalStore {
    /// Open the local storage backend, creating the root directory if needed.
    pub fn open(conf: &LocalStorageConfig) -> Result<Self, StoreError> {
        let root = conf
            .path
            .clone()
            .ok_or_else(|| StoreError::Other("missing path for local storage".into()))?;

        std::fs::create_dir_all(&root)?;
        let fs = LocalFileSystem::new_with_prefix(&root)?;

        tracing::info!(path = %root.display(), "LocalStore: opened archive directory");
        Ok(Self {
            fs: Arc::new(fs),
            root,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Remove a secret archive. Not exposed through the webhook API.
    pub async fn delete(&self, kind: SecretKind, id: &str) -> Result<(), StoreError> {
        let path = archive_path(kind, id)?;
        let _guard = self.lock.write().await;
        self.fs.delete(&path).await.map_err(not_found)?;
        tracing::debug!(kind = ?kind, id = %id, "LocalStore: archive deleted");
        Ok(())
    }

    async fn load(&self, kind: SecretKind, id: &str) -> Result<Vec<u8>, StoreError> {
        let path = archive_path(kind, id)?;
        let _guard = self.lock.read().await;

        let archive = self
            .fs
            .get(&path)
            .await
            .map_err(not_found)?
            .bytes()
            .await
            .map_err(not_found)?;

        // An empty file holds no frame, so there is no payload to return.
        if archive.is_empty() {
            return Err(StoreError::NotFound);
        }

        let payload = zstd::decode_all(archive.as_ref())?;
        Ok(payload)
    }

    async fn save(&self, kind: SecretKind, id: &str, payload: &[u8]) -> Result<(), StoreError> {
        let path = archive_path(kind, id)?;
        let archive = zstd::encode_all(payload, COMPRESSION_LEVEL)?;

        let _guard = self.lock.write().await;
        self.fs.put(&path, archive.into()).await?;

        tracing::debug!(kind = ?kind, id = %id, "LocalStore: archive written");
        Ok(())
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn get_password(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.load(SecretKind::Password, id).await
    }

    async fn update_password(&self, id: &str, password: &[u8]) -> Result<(), StoreError> {
        self.save(SecretKind::Password, id, password).await
    }

    async fn get_certificate(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        self.load(SecretKind::Certificate, id).await
    }

    async fn update_certificate(&self, id: &str, cert: &[u8]) -> Result<(), StoreError> {
        self.save(SecretKind::Certificate, id, cert).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The archive file for a secret, kept as a single path segment so ids containing
/// separators cannot escape the root directory.
fn archive_path(kind: SecretKind, id: &str) -> Result<Path, StoreError> {
    let file_name = format!("{}.{}", storage_key(kind, id)?, ARCHIVE_EXT);
    Ok(Path::from_iter([file_name.as_str()]))
}

fn not_found(err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound,
        other => StoreError::ObjectStore(other),
    }
}
