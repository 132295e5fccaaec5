//! Custom Axum extractors.

pub mod actor;
pub mod json;
pub mod path;

pub use actor::{ACTOR_HEADER, Actor};
pub use json::ValidatedJson;
pub use path::parse_job_id;
