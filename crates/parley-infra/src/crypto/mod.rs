//! Cryptographic operations for Parley.
//!
//! - `credentials`: Argon2id password hashing and SHA-256 token hashing

pub mod credentials;
