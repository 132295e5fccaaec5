//! Local filesystem object store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use suncube_core::config::storage::LocalStorageConfig;
use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;
use suncube_core::traits::storage::{ObjectStore, SignedUrl};

use super::validate_key;
use crate::signer::UrlSigner;

/// Object store rooted at a local directory.
///
/// Signed URLs point back at this service's `/artifacts/{key}` route and
/// carry a token produced by the shared [`UrlSigner`].
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Root directory for all stored objects.
    root: PathBuf,
    /// Base URL that download links are built on.
    public_base_url: String,
    /// Token signer for download links.
    signer: UrlSigner,
}

impl LocalObjectStore {
    /// Create a new local object store, creating the root directory if needed.
    pub async fn new(config: &LocalStorageConfig) -> AppResult<Self> {
        let root = PathBuf::from(&config.root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            signer: UrlSigner::new(&config.signing_secret),
        })
    }

    /// The signer used for this store's download links.
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Resolve a key to a path within the root.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()))
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> AppResult<()> {
        let full_path = self.resolve(key)?;
        self.ensure_parent(&full_path).await?;

        // Write then rename so readers never observe a partial object.
        let tmp_path = full_path.with_extension("part");
        fs::write(&tmp_path, &data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to write object: {key}"), e)
        })?;
        fs::rename(&tmp_path, &full_path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to commit object: {key}"), e)
        })?;

        debug!(key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        let full_path = self.resolve(key)?;
        let data = fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(ErrorKind::Storage, format!("Failed to read object: {key}"), e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let full_path = self.resolve(key)?;
        Ok(fs::try_exists(&full_path).await.unwrap_or(false))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> AppResult<SignedUrl> {
        let key = validate_key(key)?;
        let (token, expires_at) = self.signer.sign(key, ttl)?;
        Ok(SignedUrl {
            url: format!("{}/artifacts/{key}?token={token}", self.public_base_url),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> LocalObjectStore {
        LocalObjectStore::new(&LocalStorageConfig {
            root_path: dir.path().to_string_lossy().into_owned(),
            public_base_url: "http://localhost:3000/".to_string(),
            signing_secret: "test-secret".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_overwrites_and_get_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .put("invoices/c1/p1.pdf", Bytes::from_static(b"first"), "application/pdf")
            .await
            .unwrap();
        store
            .put("invoices/c1/p1.pdf", Bytes::from_static(b"second"), "application/pdf")
            .await
            .unwrap();

        assert!(store.exists("invoices/c1/p1.pdf").await.unwrap());
        assert_eq!(store.get("invoices/c1/p1.pdf").await.unwrap(), Bytes::from_static(b"second"));
        assert!(!dir.path().join("invoices/c1/p1.part").exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store.get("invoices/none.pdf").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!store.exists("invoices/none.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_signed_url_points_at_artifact_route() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let signed = store
            .signed_url("invoices/c1/p1.pdf", Duration::from_secs(3600))
            .await
            .unwrap();

        let prefix = "http://localhost:3000/artifacts/invoices/c1/p1.pdf?token=";
        assert!(signed.url.starts_with(prefix));
        let token = &signed.url[prefix.len()..];
        store.signer().verify(token, "invoices/c1/p1.pdf").unwrap();
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store
            .put("../escape.pdf", Bytes::from_static(b"x"), "application/pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
