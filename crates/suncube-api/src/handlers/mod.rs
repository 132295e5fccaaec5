//! Route handlers.

pub mod artifact;
pub mod health;
pub mod invoice;
pub mod job;
