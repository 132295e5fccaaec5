//! # suncube-api
//!
//! HTTP API layer for SunCube invoicing built on Axum.
//!
//! Provides the Status API endpoints (submit, status, artifact link), the
//! signed artifact download route, a Server-Sent Events stream of job
//! lifecycle events, health and stats endpoints, middleware, extractors,
//! DTOs, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{Backends, run_server, run_worker};
pub use router::build_router;
pub use state::AppState;
