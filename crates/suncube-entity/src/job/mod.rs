//! Background job domain entities.

pub mod error;
pub mod event;
pub mod model;
pub mod state;
pub mod task;
pub mod transition;

pub use error::{JobError, JobErrorKind};
pub use event::{JobEvent, JobEventKind};
pub use model::{Job, NewJob};
pub use state::JobState;
pub use task::{GenerateInvoicePayload, TaskType};
pub use transition::{Claim, JobTransition};
