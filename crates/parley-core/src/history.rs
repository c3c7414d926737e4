//! Lazy, restartable conversation history.
//!
//! A `HistoryQuery` describes "messages of this conversation after id N, at
//! most L of them". Streaming it pages through `MessageStore::fetch_after`,
//! so a large backlog is never materialized at once. The stream is finite and
//! can be resumed from the last id a consumer saw.

use std::sync::Arc;

use async_stream::stream;
use futures_util::{Stream, TryStreamExt};
use parley_types::error::StoreError;
use parley_types::message::{ConversationId, Message};

use crate::repository::message::MessageStore;

/// Rows fetched per store round-trip when no page size is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Parameters of a history replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub conversation_id: ConversationId,
    pub since_message_id: u64,
    pub limit: u32,
    pub page_size: u32,
}

impl HistoryQuery {
    pub fn new(conversation_id: ConversationId, since_message_id: u64, limit: u32) -> Self {
        Self {
            conversation_id,
            since_message_id,
            limit,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The query that continues after `last_seen`, with the remaining budget.
    pub fn resume_after(&self, last_seen: u64, already_read: u32) -> Self {
        Self {
            conversation_id: self.conversation_id.clone(),
            since_message_id: last_seen.max(self.since_message_id),
            limit: self.limit.saturating_sub(already_read),
            page_size: self.page_size,
        }
    }

    /// Stream messages in ascending `message_id` order.
    ///
    /// A store error ends the stream after yielding it.
    pub fn stream<S>(
        &self,
        store: Arc<S>,
    ) -> impl Stream<Item = Result<Message, StoreError>> + Send + use<S>
    where
        S: MessageStore + 'static,
    {
        let conversation_id = self.conversation_id.clone();
        let mut cursor = self.since_message_id;
        let mut remaining = self.limit;
        let page_size = self.page_size.max(1);

        stream! {
            while remaining > 0 {
                let want = remaining.min(page_size);
                let page = match store.fetch_after(&conversation_id, cursor, want).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                let fetched = page.len() as u32;

                for message in page {
                    cursor = message.message_id;
                    remaining = remaining.saturating_sub(1);
                    yield Ok(message);
                }

                // A short page means the log is exhausted.
                if fetched < want {
                    break;
                }
            }
        }
    }

    /// Drain the stream into a vector.
    pub async fn collect<S>(&self, store: Arc<S>) -> Result<Vec<Message>, StoreError>
    where
        S: MessageStore + 'static,
    {
        self.stream(store).try_collect().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
