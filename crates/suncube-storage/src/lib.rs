//! # suncube-storage
//!
//! Durable storage for rendered artifacts and the time-limited URLs used to
//! download them. The local provider signs its own URLs with an HS256 token
//! that the HTTP layer verifies; the S3 provider (feature `s3`) hands out
//! native presigned URLs.

pub mod manager;
pub mod providers;
pub mod signer;

pub use manager::StorageBackend;
pub use signer::UrlSigner;
