//! Account service: registration, login and session tokens.
//!
//! A session's identity is always derived from a token issued here, never
//! from a field the client sends along with a request.

use std::sync::Arc;

use chrono::Utc;
use parley_types::error::{AccountError, RepositoryError};
use parley_types::user::{Account, AccountSummary, UserId};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::repository::account::AccountRepository;
use crate::service::hash::CredentialHasher;

/// Issued on a successful login. The token plaintext is only available here.
pub struct LoginGrant {
    pub user_id: UserId,
    pub token: SecretString,
}

impl std::fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGrant")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Service for accounts and their bearer tokens.
///
/// Generic over the repository and the hasher so the service stays in
/// parley-core without depending on parley-infra.
pub struct AccountService<R: AccountRepository, H: CredentialHasher> {
    repo: Arc<R>,
    hasher: Arc<H>,
}

impl<R: AccountRepository, H: CredentialHasher> AccountService<R, H> {
    pub fn new(repo: Arc<R>, hasher: Arc<H>) -> Self {
        Self { repo, hasher }
    }

    /// Create an account. Username and password are trimmed first.
    pub async fn register(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Account, AccountError> {
        let username = username.trim();
        let password = password.expose_secret().trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingField);
        }

        let user_id = UserId::parse(username)?;
        let account = Account {
            password_hash: self.hasher.hash_password(password)?,
            user_id,
            created_at: Utc::now(),
        };

        self.repo.create_account(&account).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AccountError::AlreadyExists(username.to_string()),
            other => AccountError::Storage(other),
        })?;

        info!(user_id = %account.user_id, "registered account");
        Ok(account)
    }

    /// Verify credentials and issue a new token.
    ///
    /// Unknown users and wrong passwords fail the same way.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginGrant, AccountError> {
        let username = username.trim();
        let password = password.expose_secret().trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingField);
        }

        let Ok(user_id) = UserId::parse(username) else {
            return Err(AccountError::InvalidCredentials);
        };
        let Some(account) = self.repo.get_account(&user_id).await? else {
            debug!(%user_id, "login for unknown user");
            return Err(AccountError::InvalidCredentials);
        };
        if !self.hasher.verify_password(password, &account.password_hash) {
            debug!(%user_id, "login with wrong password");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.hasher.generate_token();
        self.repo
            .save_token(&self.hasher.hash_token(&token), &user_id, Utc::now())
            .await?;

        info!(%user_id, "issued session token");
        Ok(LoginGrant {
            user_id,
            token: SecretString::from(token),
        })
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<UserId, AccountError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AccountError::InvalidToken);
        }
        let token_hash = self.hasher.hash_token(token);
        let user_id = self
            .repo
            .find_token(&token_hash)
            .await?
            .ok_or(AccountError::InvalidToken)?;

        // Best effort; a failed touch must not reject a valid token.
        if let Err(e) = self.repo.touch_token(&token_hash, Utc::now()).await {
            warn!(%user_id, error = %e, "failed to update token last_used_at");
        }
        Ok(user_id)
    }

    /// Revoke a token. Returns whether it was live; revoking twice is fine.
    pub async fn logout(&self, token: &str) -> Result<bool, AccountError> {
        let revoked = self
            .repo
            .revoke_token(&self.hasher.hash_token(token.trim()))
            .await?;
        if revoked {
            info!("revoked session token");
        }
        Ok(revoked)
    }

    pub async fn exists(&self, user_id: &UserId) -> Result<bool, AccountError> {
        Ok(self.repo.get_account(user_id).await?.is_some())
    }

    pub async fn list_users(&self) -> Result<Vec<AccountSummary>, AccountError> {
        Ok(self.repo.list_accounts().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
