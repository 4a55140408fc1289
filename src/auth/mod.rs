//! Caller identity for deploy-test triggers.
//!
//! Authentication itself happens upstream; requests reach this server with the
//! user's identity in the `X-User-Email` header.

mod extractor;

pub use extractor::{AuthError, TriggeredBy};
