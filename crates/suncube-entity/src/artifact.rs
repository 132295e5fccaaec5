//! Rendered artifact reference.

use serde::{Deserialize, Serialize};

use suncube_core::types::PaymentId;

/// A document produced by a job and kept in durable storage.
///
/// Jobs reference artifacts by `storage_key`; the bytes themselves live
/// only in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque locator in the object store.
    pub storage_key: String,
    /// Payment the artifact was derived from.
    pub payment_id: PaymentId,
    /// MIME type of the stored object.
    pub content_type: String,
    /// Size of the stored object in bytes.
    pub size_bytes: u64,
}
