//! In-memory object store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use suncube_core::error::AppError;
use suncube_core::result::AppResult;
use suncube_core::traits::storage::{ObjectStore, SignedUrl};

use super::validate_key;
use crate::signer::UrlSigner;

/// Object store held in process memory. Download links use the same
/// `/artifacts/{key}` route and token scheme as the local store.
#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, (Bytes, String)>>>,
    public_base_url: String,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new(public_base_url: &str, signing_secret: &str) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer: UrlSigner::new(signing_secret),
        }
    }

    /// The signer used for this store's download links.
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Content type recorded for `key`.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        let key = validate_key(key)?;
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        let key = validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| AppError::not_found(format!("Object not found: {key}")))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let key = validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
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
