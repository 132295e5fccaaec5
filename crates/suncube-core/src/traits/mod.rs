//! Core traits defined in `suncube-core` and implemented by other crates.

pub mod storage;

pub use storage::{ObjectStore, SignedUrl};
