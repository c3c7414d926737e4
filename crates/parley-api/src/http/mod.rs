//! HTTP layer for Parley.
//!
//! Axum-based REST API at `/api/v1/` with bearer token authentication and
//! envelope response format, plus the `/ws` real-time endpoint.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
