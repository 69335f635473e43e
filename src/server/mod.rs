//! Server module
//!
//! HTTP server exposing the probe pipeline.

pub mod bind;
pub mod connect_info;
pub mod http;

pub use bind::{listen_addr, serve, shutdown_signal, ServerError};
pub use http::{create_router, ApiError, AppState, HealthResponse, ProbeRequest};
