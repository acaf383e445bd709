//! practest-client: exam service integrations.
//!
//! Implements the `ExamApi` trait over HTTP, provides bearer-token stores,
//! loads configuration, and ships in-process doubles for driving the
//! controllers in tests.

pub mod auth;
pub mod config;
pub mod http;
pub mod mock;

pub use auth::{FileTokenStore, MemoryTokenStore};
pub use config::{create_api, load_config, load_config_from, PractestConfig};
pub use http::HttpExamApi;
pub use practest_core::error::ApiError;
