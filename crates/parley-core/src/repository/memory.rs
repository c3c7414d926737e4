//! In-process implementations of the repository traits.
//!
//! `InMemoryMessageStore` keeps one log per conversation behind its own async
//! mutex, so appends to different conversations never wait on each other.
//! Nothing survives a restart; "durable" here means "visible to every reader
//! once `append` returns".

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_types::error::{RepositoryError, StoreError};
use parley_types::message::{ConversationId, Message};
use parley_types::session::SessionId;
use parley_types::user::{Account, AccountSummary, UserId};
use tokio::sync::Mutex;

use super::account::AccountRepository;
use super::message::MessageStore;

type ConversationLog = Arc<Mutex<Vec<Message>>>;

/// Message store backed by process memory.
#[derive(Default)]
pub struct InMemoryMessageStore {
    conversations: DashMap<ConversationId, ConversationLog>,
    unavailable: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage of the backing store: every operation fails with
    /// `StorageUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::StorageUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn log(&self, conversation_id: &ConversationId) -> ConversationLog {
        Arc::clone(&self.conversations.entry(conversation_id.clone()).or_default())
    }

    fn existing_log(&self, conversation_id: &ConversationId) -> Option<ConversationLog> {
        self.conversations.get(conversation_id).map(|l| Arc::clone(&l))
    }

    fn all_logs(&self) -> Vec<ConversationLog> {
        self.conversations.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl MessageStore for InMemoryMessageStore {
    async fn append(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        body: &str,
    ) -> Result<Message, StoreError> {
        self.check_available()?;

        let conversation_id = ConversationId::between(sender_id, receiver_id);
        let log = self.log(&conversation_id);
        let mut messages = log.lock().await;

        let message = Message {
            message_id: messages.len() as u64 + 1,
            conversation_id,
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            body: body.to_string(),
            created_at: Utc::now(),
            delivered: BTreeSet::new(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn fetch_after(
        &self,
        conversation_id: &ConversationId,
        after_message_id: u64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;

        let Some(log) = self.existing_log(conversation_id) else {
            return Ok(Vec::new());
        };
        let messages = log.lock().await;
        Ok(messages
            .iter()
            .filter(|m| m.message_id > after_message_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
        sessions: &[SessionId],
    ) -> Result<BTreeSet<SessionId>, StoreError> {
        self.check_available()?;

        let not_found = || StoreError::MessageNotFound {
            conversation_id: conversation_id.to_string(),
            message_id,
        };
        let log = self.existing_log(conversation_id).ok_or_else(not_found)?;
        let mut messages = log.lock().await;
        let message = message_id
            .checked_sub(1)
            .and_then(|idx| messages.get_mut(idx as usize))
            .ok_or_else(not_found)?;

        message.delivered.extend(sessions.iter().copied());
        Ok(message.delivered.clone())
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
    ) -> Result<Option<Message>, StoreError> {
        self.check_available()?;

        let Some(log) = self.existing_log(conversation_id) else {
            return Ok(None);
        };
        let messages = log.lock().await;
        Ok(message_id
            .checked_sub(1)
            .and_then(|idx| messages.get(idx as usize))
            .cloned())
    }

    async fn count_messages(&self) -> Result<u64, StoreError> {
        self.check_available()?;

        let mut total = 0u64;
        for log in self.all_logs() {
            total += log.lock().await.len() as u64;
        }
        Ok(total)
    }

    async fn count_conversations(&self) -> Result<u64, StoreError> {
        self.check_available()?;

        let mut total = 0u64;
        for log in self.all_logs() {
            if !log.lock().await.is_empty() {
                total += 1;
            }
        }
        Ok(total)
    }
}

impl std::fmt::Debug for InMemoryMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageStore")
            .field("conversations", &self.conversations.len())
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}

struct TokenRecord {
    user_id: UserId,
    last_used_at: Option<DateTime<Utc>>,
}

/// Account repository backed by process memory.
#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: DashMap<UserId, Account>,
    tokens: DashMap<String, TokenRecord>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the token was last used, if ever.
    pub fn token_last_used(&self, token_hash: &str) -> Option<DateTime<Utc>> {
        self.tokens.get(token_hash).and_then(|t| t.last_used_at)
    }
}

impl AccountRepository for InMemoryAccountRepository {
    async fn create_account(&self, account: &Account) -> Result<(), RepositoryError> {
        match self.accounts.entry(account.user_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "user '{}' already exists",
                account.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(())
            }
        }
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>, RepositoryError> {
        Ok(self.accounts.get(user_id).map(|a| a.clone()))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, RepositoryError> {
        let mut summaries: Vec<AccountSummary> = self
            .accounts
            .iter()
            .map(|a| AccountSummary {
                user_id: a.user_id.clone(),
                created_at: a.created_at,
                active_tokens: self
                    .tokens
                    .iter()
                    .filter(|t| t.user_id == a.user_id)
                    .count() as u32,
            })
            .collect();
        summaries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(summaries)
    }

    async fn save_token(
        &self,
        token_hash: &str,
        user_id: &UserId,
        _created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.tokens.insert(
            token_hash.to_string(),
            TokenRecord {
                user_id: user_id.clone(),
                last_used_at: None,
            },
        );
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> Result<Option<UserId>, RepositoryError> {
        Ok(self.tokens.get(token_hash).map(|t| t.user_id.clone()))
    }

    async fn touch_token(
        &self,
        token_hash: &str,
        used_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(mut record) = self.tokens.get_mut(token_hash) {
            record.last_used_at = Some(used_at);
        }
        Ok(())
    }

    async fn revoke_token(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        Ok(self.tokens.remove(token_hash).is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
