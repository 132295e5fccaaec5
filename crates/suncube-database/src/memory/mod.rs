//! In-memory store implementations for single-node runs and tests.

pub mod audit;
pub mod job;
pub mod payment;

pub use audit::MemoryAuditLog;
pub use job::MemoryJobStore;
pub use payment::MemoryPaymentDirectory;
