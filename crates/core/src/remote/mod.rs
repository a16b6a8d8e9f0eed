//! Remote report service abstraction.
//!
//! This module provides a `RemoteReportService` trait for the asynchronous
//! report API (create, poll, fetch) and an HTTP implementation of it.

mod qualys;
mod types;

pub use qualys::QualysClient;
pub use types::*;
