//! lpvres Server - Scheduler extender HTTP endpoint
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The filter endpoint answering extender requests
//! - Health, liveness and readiness probes

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use server::{Config, PredicateServer, FILTER_PATH};
pub use state::AppState;
