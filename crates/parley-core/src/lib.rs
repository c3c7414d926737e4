//! Business logic and repository trait definitions for Parley.
//!
//! This crate holds the delivery core: the session registry, the message store
//! port (plus an in-memory implementation), the delivery router and history
//! replay, and the account service. It depends only on `parley-types` --
//! never on `parley-infra` or any database/IO crate.

pub mod delivery;
pub mod history;
pub mod repository;
pub mod service;
pub mod session;
