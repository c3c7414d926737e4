//! Account repository trait definition.
//!
//! Stores provisioned accounts and the hashes of issued bearer tokens.

use chrono::{DateTime, Utc};
use parley_types::error::RepositoryError;
use parley_types::user::{Account, AccountSummary, UserId};

/// Repository trait for accounts and session tokens.
///
/// Token plaintext never reaches the repository; only its hash does.
pub trait AccountRepository: Send + Sync {
    /// Insert a new account. Returns `Conflict` if the user id is taken.
    fn create_account(
        &self,
        account: &Account,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an account by user id.
    fn get_account(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<Account>, RepositoryError>> + Send;

    /// List all accounts, ordered by user id.
    fn list_accounts(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<AccountSummary>, RepositoryError>> + Send;

    /// Store the hash of a newly issued token.
    fn save_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        created_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Resolve a token hash to its user, if the token is live.
    fn find_token(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserId>, RepositoryError>> + Send;

    /// Record that a token was just used.
    fn touch_token(
        &self,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Revoke a token. Returns `true` if it existed.
    fn revoke_token(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
