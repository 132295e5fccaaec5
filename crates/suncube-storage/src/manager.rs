//! Storage backend selected from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use suncube_core::config::StorageConfig;
use suncube_core::error::AppError;
use suncube_core::result::AppResult;
use suncube_core::traits::storage::ObjectStore;

use crate::providers::{LocalObjectStore, MemoryObjectStore};
use crate::signer::UrlSigner;

/// The configured object store plus what the HTTP layer needs to serve it.
#[derive(Debug, Clone)]
pub struct StorageBackend {
    /// Artifact store.
    pub store: Arc<dyn ObjectStore>,
    /// Token signer when this service serves downloads itself (local provider).
    pub signer: Option<UrlSigner>,
    /// Lifetime of issued download URLs.
    pub url_ttl: Duration,
}

impl StorageBackend {
    /// Build the store selected by `config.provider`.
    pub async fn connect(config: &StorageConfig) -> AppResult<Self> {
        let url_ttl = Duration::from_secs(config.url_ttl_seconds);
        match config.provider.as_str() {
            "local" => {
                info!(root = %config.local.root_path, "Initializing local object store");
                let store = LocalObjectStore::new(&config.local).await?;
                let signer = store.signer().clone();
                Ok(Self {
                    store: Arc::new(store),
                    signer: Some(signer),
                    url_ttl,
                })
            }
            "memory" => {
                info!("Initializing in-memory object store (non-durable)");
                let store = MemoryObjectStore::new(
                    &config.local.public_base_url,
                    &config.local.signing_secret,
                );
                let signer = store.signer().clone();
                Ok(Self {
                    store: Arc::new(store),
                    signer: Some(signer),
                    url_ttl,
                })
            }
            #[cfg(feature = "s3")]
            "s3" => {
                let store = crate::providers::S3ObjectStore::new(&config.s3).await?;
                Ok(Self {
                    store: Arc::new(store),
                    signer: None,
                    url_ttl,
                })
            }
            other => Err(AppError::configuration(format!(
                "Unknown storage provider: '{other}'. Supported: local, memory{}",
                if cfg!(feature = "s3") { ", s3" } else { "" }
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use suncube_core::error::ErrorKind;

    #[tokio::test]
    async fn test_local_backend_has_signer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::default();
        config.local.root_path = dir.path().to_string_lossy().into_owned();

        let backend = StorageBackend::connect(&config).await.unwrap();
        assert_eq!(backend.store.provider_type(), "local");
        assert!(backend.signer.is_some());
        assert_eq!(backend.url_ttl, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let config = StorageConfig {
            provider: "ftp".to_string(),
            ..StorageConfig::default()
        };
        let err = StorageBackend::connect(&config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
