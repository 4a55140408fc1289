//! Deploy-test pipeline suite.
//!
//! Drives the full pipeline against an in-process mock of the package mirror
//! and the external test service. Runs are kept in the in-memory store, so no
//! database is needed.
//!
//! Run with: cargo test --test pipeline

mod mock_services;
mod test_helpers;

mod test_api;
mod test_pipeline_failures;
mod test_pipeline_success;
