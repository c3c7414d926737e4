//! SQLite message store implementation.
//!
//! Implements `MessageStore` from `parley-core` using sqlx with split
//! read/write pools. Message ids are assigned from a per-conversation counter
//! row that is bumped in the same transaction as the insert, so concurrent
//! sends to one conversation get distinct, gapless ids.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parley_core::repository::message::MessageStore;
use parley_types::error::StoreError;
use parley_types::message::{ConversationId, Message};
use parley_types::session::SessionId;
use parley_types::user::UserId;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageStore`.
pub struct SqliteMessageStore {
    pool: DatabasePool,
}

impl SqliteMessageStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delivered sets for messages `(after, up_to]` of a conversation.
    async fn deliveries_between(
        &self,
        conversation_id: &str,
        after: i64,
        up_to: i64,
    ) -> Result<BTreeMap<i64, BTreeSet<SessionId>>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT message_id, session_id FROM message_deliveries
               WHERE conversation_id = ? AND message_id > ? AND message_id <= ?"#,
        )
        .bind(conversation_id)
        .bind(after)
        .bind(up_to)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let mut sets: BTreeMap<i64, BTreeSet<SessionId>> = BTreeMap::new();
        for row in &rows {
            let message_id: i64 = row.try_get("message_id").map_err(corrupt)?;
            let session_id: String = row.try_get("session_id").map_err(corrupt)?;
            sets.entry(message_id)
                .or_default()
                .insert(parse_session_id(&session_id)?);
        }
        Ok(sets)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct MessageRow {
    conversation_id: String,
    message_id: i64,
    sender_id: String,
    receiver_id: String,
    body: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            conversation_id: row.try_get("conversation_id")?,
            message_id: row.try_get("message_id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self, delivered: BTreeSet<SessionId>) -> Result<Message, StoreError> {
        let conversation_id = self
            .conversation_id
            .parse::<ConversationId>()
            .map_err(|e| StoreError::Corrupt(format!("invalid conversation id: {e}")))?;
        let message_id = u64::try_from(self.message_id)
            .map_err(|_| StoreError::Corrupt(format!("negative message id {}", self.message_id)))?;

        Ok(Message {
            message_id,
            conversation_id,
            sender_id: parse_user_id(&self.sender_id)?,
            receiver_id: parse_user_id(&self.receiver_id)?,
            body: self.body,
            created_at: parse_datetime(&self.created_at)?,
            delivered,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::StorageUnavailable(e.to_string())
}

fn corrupt(e: sqlx::Error) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn parse_user_id(s: &str) -> Result<UserId, StoreError> {
    UserId::parse(s).map_err(|e| StoreError::Corrupt(format!("invalid user id: {e}")))
}

fn parse_session_id(s: &str) -> Result<SessionId, StoreError> {
    s.parse::<SessionId>()
        .map_err(|e| StoreError::Corrupt(format!("invalid session id: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_sql_id(message_id: u64) -> i64 {
    i64::try_from(message_id).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// MessageStore impl
// ---------------------------------------------------------------------------

impl MessageStore for SqliteMessageStore {
    async fn append(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        body: &str,
    ) -> Result<Message, StoreError> {
        let conversation_id = ConversationId::between(sender_id, receiver_id);
        let conv_key = conversation_id.to_string();
        let created_at = Utc::now();

        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

        let (message_id,): (i64,) = sqlx::query_as(
            r#"INSERT INTO conversations (id, last_message_id) VALUES (?, 1)
               ON CONFLICT(id) DO UPDATE SET last_message_id = last_message_id + 1
               RETURNING last_message_id"#,
        )
        .bind(&conv_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(unavailable)?;

        sqlx::query(
            r#"INSERT INTO messages
               (conversation_id, message_id, sender_id, receiver_id, body, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&conv_key)
        .bind(message_id)
        .bind(sender_id.as_str())
        .bind(receiver_id.as_str())
        .bind(body)
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;

        tracing::debug!(%conversation_id, message_id, "appended message");
        Ok(Message {
            message_id: message_id as u64,
            conversation_id,
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            body: body.to_string(),
            created_at,
            delivered: BTreeSet::new(),
        })
    }

    async fn fetch_after(
        &self,
        conversation_id: &ConversationId,
        after_message_id: u64,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let conv_key = conversation_id.to_string();
        let after = to_sql_id(after_message_id);

        let rows = sqlx::query(
            r#"SELECT * FROM messages
               WHERE conversation_id = ? AND message_id > ?
               ORDER BY message_id ASC
               LIMIT ?"#,
        )
        .bind(&conv_key)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            parsed.push(MessageRow::from_row(row).map_err(corrupt)?);
        }
        let Some(last) = parsed.last().map(|r| r.message_id) else {
            return Ok(Vec::new());
        };

        let mut deliveries = self.deliveries_between(&conv_key, after, last).await?;
        parsed
            .into_iter()
            .map(|r| {
                let delivered = deliveries.remove(&r.message_id).unwrap_or_default();
                r.into_message(delivered)
            })
            .collect()
    }

    async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
        sessions: &[SessionId],
    ) -> Result<BTreeSet<SessionId>, StoreError> {
        let conv_key = conversation_id.to_string();
        let id = to_sql_id(message_id);
        let now = format_datetime(&Utc::now());

        let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

        let exists = sqlx::query("SELECT 1 FROM messages WHERE conversation_id = ? AND message_id = ?")
            .bind(&conv_key)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?;
        if exists.is_none() {
            return Err(StoreError::MessageNotFound {
                conversation_id: conv_key,
                message_id,
            });
        }

        for session_id in sessions {
            sqlx::query(
                r#"INSERT OR IGNORE INTO message_deliveries
                   (conversation_id, message_id, session_id, delivered_at)
                   VALUES (?, ?, ?, ?)"#,
            )
            .bind(&conv_key)
            .bind(id)
            .bind(session_id.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        }

        let rows = sqlx::query(
            "SELECT session_id FROM message_deliveries WHERE conversation_id = ? AND message_id = ?",
        )
        .bind(&conv_key)
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("session_id").map_err(corrupt)?;
                parse_session_id(&raw)
            })
            .collect()
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
        message_id: u64,
    ) -> Result<Option<Message>, StoreError> {
        let conv_key = conversation_id.to_string();
        let id = to_sql_id(message_id);

        let row = sqlx::query("SELECT * FROM messages WHERE conversation_id = ? AND message_id = ?")
            .bind(&conv_key)
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => {
                let parsed = MessageRow::from_row(&row).map_err(corrupt)?;
                let mut deliveries = self.deliveries_between(&conv_key, id - 1, id).await?;
                let delivered = deliveries.remove(&id).unwrap_or_default();
                Ok(Some(parsed.into_message(delivered)?))
            }
            None => Ok(None),
        }
    }

    async fn count_messages(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        Ok(count as u64)
    }

    async fn count_conversations(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(unavailable)?;
        Ok(count as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_per_conversation_ids() {
        let store = SqliteMessageStore::new(test_pool().await);
        let (a, b, c) = (uid("alice"), uid("bob"), uid("carol"));

        let m1 = store.append(&a, &b, "hi").await.unwrap();
        let m2 = store.append(&b, &a, "hey").await.unwrap();
        let other = store.append(&c, &a, "yo").await.unwrap();

        assert_eq!(m1.message_id, 1);
        assert_eq!(m2.message_id, 2);
        assert_eq!(other.message_id, 1);
        assert_eq!(m1.conversation_id.to_string(), "alice~bob");
        assert_eq!(other.conversation_id.to_string(), "alice~carol");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_gapless() {
        let store = Arc::new(SqliteMessageStore::new(test_pool().await));
        let (a, b) = (uid("alice"), uid("bob"));

        let mut handles = Vec::new();
        for i in 0..30 {
            let store = Arc::clone(&store);
            let (a, b) = (a.clone(), b.clone());
            handles.push(tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
                store.append(from, to, "x").await.unwrap().message_id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=30).collect::<Vec<u64>>());

        let conv = ConversationId::between(&a, &b);
        let fetched = store.fetch_after(&conv, 0, 100).await.unwrap();
        let fetched_ids: Vec<u64> = fetched.iter().map(|m| m.message_id).collect();
        assert_eq!(fetched_ids, (1..=30).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_fetch_after_pages() {
        let store = SqliteMessageStore::new(test_pool().await);
        let (a, b) = (uid("alice"), uid("bob"));
        for i in 0..5 {
            store.append(&a, &b, &format!("m{i}")).await.unwrap();
        }
        let conv = ConversationId::between(&a, &b);

        let page = store.fetch_after(&conv, 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message_id, 2);
        assert_eq!(page[0].body, "m1");
        assert_eq!(page[1].message_id, 3);

        assert!(store.fetch_after(&conv, 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_round_trips_verbatim() {
        let store = SqliteMessageStore::new(test_pool().await);
        let (a, b) = (uid("alice"), uid("bob"));
        let body = "  héllo\n'quoted' \"double\"  ";
        let msg = store.append(&a, &b, body).await.unwrap();

        let fetched = store.get(&msg.conversation_id, 1).await.unwrap().unwrap();
        assert_eq!(fetched.body, body);
        assert_eq!(fetched.sender_id, a);
        assert_eq!(fetched.receiver_id, b);
    }

    #[tokio::test]
    async fn test_mark_delivered_is_grow_only() {
        let store = SqliteMessageStore::new(test_pool().await);
        let (a, b) = (uid("alice"), uid("bob"));
        let msg = store.append(&a, &b, "hi").await.unwrap();
        let s1 = SessionId::new();
        let s2 = SessionId::new();

        let set = store
            .mark_delivered(&msg.conversation_id, 1, &[s1])
            .await
            .unwrap();
        assert_eq!(set, BTreeSet::from([s1]));

        let set = store
            .mark_delivered(&msg.conversation_id, 1, &[s1, s2])
            .await
            .unwrap();
        assert_eq!(set, BTreeSet::from([s1, s2]));

        let page = store.fetch_after(&msg.conversation_id, 0, 10).await.unwrap();
        assert_eq!(page[0].delivered, BTreeSet::from([s1, s2]));
    }

    #[tokio::test]
    async fn test_mark_delivered_unknown_message() {
        let store = SqliteMessageStore::new(test_pool().await);
        let conv = ConversationId::between(&uid("a"), &uid("b"));
        let err = store
            .mark_delivered(&conv, 3, &[SessionId::new()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MessageNotFound { message_id: 3, .. }));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = SqliteMessageStore::new(test_pool().await);
        let conv = ConversationId::between(&uid("a"), &uid("b"));
        assert!(store.get(&conv, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counts() {
        let store = SqliteMessageStore::new(test_pool().await);
        store.append(&uid("a"), &uid("b"), "1").await.unwrap();
        store.append(&uid("b"), &uid("a"), "2").await.unwrap();
        store.append(&uid("c"), &uid("d"), "3").await.unwrap();

        assert_eq!(store.count_messages().await.unwrap(), 3);
        assert_eq!(store.count_conversations().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_pool_is_storage_unavailable() {
        let pool = test_pool().await;
        let store = SqliteMessageStore::new(pool.clone());
        pool.close().await;

        let err = store.append(&uid("a"), &uid("b"), "hi").await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }
}
