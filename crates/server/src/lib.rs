//! HTTP server for resumable chunked uploads.
//!
//! This crate provides:
//! - The upload session registry
//! - Status, chunk upload, listing and ranged download endpoints
//! - The optional reaper for abandoned sessions and orphaned chunks
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use registry::SessionRegistry;
pub use routes::create_router;
pub use state::AppState;
