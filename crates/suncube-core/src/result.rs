//! Convenience result type alias for SunCube.

use crate::error::AppError;

/// A specialized `Result` type for SunCube operations.
pub type AppResult<T> = Result<T, AppError>;
