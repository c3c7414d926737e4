//! CredentialHasher trait for passwords and session tokens.
//!
//! Defined in parley-core so the account service can hash and verify
//! credentials without coupling to a specific algorithm. The Argon2/SHA-256
//! adapter lives in parley-infra.

use parley_types::error::AccountError;

/// Abstraction over credential hashing and token minting.
pub trait CredentialHasher: Send + Sync {
    /// Hash a password into a self-describing string (salt included).
    fn hash_password(&self, password: &str) -> Result<String, AccountError>;

    /// Check `password` against a hash produced by `hash_password`.
    ///
    /// A malformed hash verifies as `false`.
    fn verify_password(&self, password: &str, password_hash: &str) -> bool;

    /// Mint a new random bearer token.
    fn generate_token(&self) -> String;

    /// Deterministic lookup hash of a token.
    fn hash_token(&self, token: &str) -> String;
}
