//! Payment records consumed by the invoice renderer.

pub mod model;

pub use model::Payment;
