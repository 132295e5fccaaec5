//! HS256 download tokens for locally stored artifacts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use suncube_core::error::{AppError, ErrorKind};
use suncube_core::result::AppResult;

/// Claims carried by a download token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownloadClaims {
    /// Storage key the token grants access to.
    sub: String,
    /// Issued at (unix seconds).
    iat: i64,
    /// Expiry (unix seconds).
    exp: i64,
}

/// Issues and verifies download tokens bound to a single storage key.
#[derive(Clone)]
pub struct UrlSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("validation", &self.validation)
            .finish()
    }
}

impl UrlSigner {
    /// Create a signer from a shared secret.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `key` for `ttl`, returning the token and its expiry.
    pub fn sign(&self, key: &str, ttl: Duration) -> AppResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::with_source(ErrorKind::Validation, "URL TTL out of range", e))?;
        let expires_at = now + ttl;

        let claims = DownloadClaims {
            sub: key.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to sign URL", e))?;
        Ok((token, expires_at))
    }

    /// Check that `token` is valid, unexpired, and was issued for `key`.
    pub fn verify(&self, token: &str, key: &str) -> AppResult<()> {
        let data = decode::<DownloadClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                AppError::with_source(ErrorKind::Forbidden, "Invalid or expired download token", e)
            })?;
        if data.claims.sub != key {
            return Err(AppError::forbidden("Download token was issued for another key"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_bound_to_key() {
        let signer = UrlSigner::new("secret");
        let (token, expires_at) = signer
            .sign("invoices/c/p.pdf", Duration::from_secs(60))
            .unwrap();
        assert!(expires_at > Utc::now());
        signer.verify(&token, "invoices/c/p.pdf").unwrap();

        let err = signer.verify(&token, "invoices/c/other.pdf").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let (token, _) = UrlSigner::new("a")
            .sign("k.pdf", Duration::from_secs(60))
            .unwrap();
        let err = UrlSigner::new("b").verify(&token, "k.pdf").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let signer = UrlSigner::new("secret");
        let claims = DownloadClaims {
            sub: "k.pdf".to_string(),
            iat: Utc::now().timestamp() - 120,
            exp: Utc::now().timestamp() - 60,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &signer.encoding_key).unwrap();
        assert!(signer.verify(&token, "k.pdf").is_err());
    }
}
