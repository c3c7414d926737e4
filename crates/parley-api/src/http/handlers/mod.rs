//! HTTP and WebSocket request handlers.

pub mod auth;
pub mod history;
pub mod ws;
