//! Visual Search
//!
//! Detection regions, ranked results, and the backend that produces them.
//!
//! ## Layout
//!
//! - **models.rs**: wire and domain types (normalized boxes, regions, results)
//! - **provider.rs**: the `SearchBackend` trait every backend implements
//! - **providers/**: concrete backends (REST over HTTP)

pub mod models;
pub mod provider;
pub mod providers;

pub use models::*;
pub use provider::{validate_query, SearchBackend};
pub use providers::HttpSearchBackend;
