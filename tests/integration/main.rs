//! End-to-end tests over the HTTP router with in-memory backends.

mod helpers;

mod invoice_test;
mod job_test;
