//! Infrastructure layer for Parley.
//!
//! Contains implementations of the repository traits defined in `parley-core`:
//! SQLite storage for messages and accounts, Argon2/SHA-256 credential
//! hashing, config loading and data directory resolution.

pub mod config;
pub mod crypto;
pub mod filesystem;
pub mod sqlite;
