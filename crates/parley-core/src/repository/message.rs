//! Message store trait definition.
//!
//! The message store is the append-only durable log of direct messages, keyed
//! by conversation. The infrastructure layer (parley-infra) implements this
//! trait with SQLite persistence; `memory::InMemoryMessageStore` keeps the log
//! in process.

use std::collections::BTreeSet;

use parley_types::error::StoreError;
use parley_types::message::{ConversationId, Message};
use parley_types::session::SessionId;
use parley_types::user::UserId;

/// Append-only, per-conversation ordered message log.
///
/// Implementations must guarantee:
/// - `append` assigns `last + 1` as the message id of the conversation
///   atomically; two concurrent appends to the same conversation never share
///   an id, and ids have no gaps.
/// - `append` only returns `Ok` once the message is durable.
/// - the `delivered` set of a message only grows.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageStore: Send + Sync {
    /// Persist a new message from `sender_id` to `receiver_id`.
    ///
    /// Fails with `StoreError::StorageUnavailable` if the backing store cannot
    /// be written; the message must then be considered unsent.
    fn append(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        body: &str,
    ) -> impl std::future::Future<Output = Result<Message, StoreError>> + Send;

    /// Up to `limit` messages with `message_id > after_message_id`, ascending.
    fn fetch_after(
        &self,
        conversation_id: &ConversationId,
        after_message_id: u64,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Add `sessions` to the message's delivered set and return the full set.
    ///
    /// Session ids already present are ignored.
    fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
        sessions: &[SessionId],
    ) -> impl std::future::Future<Output = Result<BTreeSet<SessionId>, StoreError>> + Send;

    /// Look up a single message.
    fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
    ) -> impl std::future::Future<Output = Result<Option<Message>, StoreError>> + Send;

    /// Total number of stored messages.
    fn count_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Number of conversations holding at least one message.
    fn count_conversations(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
