//! Read-only random-access view of a search index stored in S3.
//!
//! See [`store`] for the architecture.

pub mod store;

pub use store::*;
