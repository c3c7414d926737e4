//! Shared domain types for Parley.
//!
//! This crate contains the core domain types of the direct-messaging core:
//! users, sessions, messages, wire events, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod session;
pub mod user;
