//! Search Backends
//!
//! - **http.rs**: REST client for the detection / search service

pub mod http;

pub use http::HttpSearchBackend;
