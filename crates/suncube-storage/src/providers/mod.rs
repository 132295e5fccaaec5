//! Object storage provider implementations.

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

use suncube_core::error::AppError;
use suncube_core::result::AppResult;

/// Reject keys that are empty or could escape the storage root.
pub fn validate_key(key: &str) -> AppResult<&str> {
    let clean = key.trim_start_matches('/');
    if clean.is_empty()
        || clean
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || clean.contains('\\')
    {
        return Err(AppError::validation(format!("Invalid storage key: '{key}'")));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key("invoices/c/p.pdf").unwrap(), "invoices/c/p.pdf");
        assert_eq!(validate_key("/invoices/p.pdf").unwrap(), "invoices/p.pdf");
        assert!(validate_key("").is_err());
        assert!(validate_key("invoices/../secret").is_err());
        assert!(validate_key("invoices//p.pdf").is_err());
        assert!(validate_key("..\\windows").is_err());
    }
}
