//! Delivery router: the send path of a direct message.
//!
//! A send moves through `Received -> Persisted -> Delivering ->
//! Delivered | PartiallyDelivered`. The message is appended to the store
//! before any push is attempted, so a message is never visible to a recipient
//! without being durable. Pushes to the target sessions run concurrently and
//! each is bounded by the push timeout; a slow or dead session only costs its
//! own delivery.
//!
//! Targets are the receiver's live sessions plus the sender's other live
//! sessions. The originating session is excluded; it gets the persisted
//! message back as the send acknowledgment instead.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use parley_types::config::GlobalConfig;
use parley_types::error::SendError;
use parley_types::event::ServerEvent;
use parley_types::message::{ConversationId, DeliveryState, Message};
use parley_types::session::{Session, SessionId};
use parley_types::user::UserId;
use tracing::{debug, info, trace, warn};

use crate::history::HistoryQuery;
use crate::repository::message::MessageStore;
use crate::session::SessionRegistry;

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// The persisted message, with the sessions it reached.
    pub message: Message,
    /// `Delivered` or `PartiallyDelivered`.
    pub outcome: DeliveryState,
    /// Target sessions whose push failed or timed out.
    pub failed: Vec<SessionId>,
}

/// Tracks the lifecycle of one send.
struct Lifecycle {
    state: DeliveryState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: DeliveryState::Received,
        }
    }

    fn advance(&mut self, next: DeliveryState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal delivery transition {} -> {}",
            self.state,
            next
        );
        trace!(from = %self.state, to = %next, "delivery state");
        self.state = next;
    }
}

/// Persists direct messages and pushes them to live sessions.
pub struct DeliveryRouter<S: MessageStore> {
    store: Arc<S>,
    registry: Arc<SessionRegistry>,
    config: GlobalConfig,
}

impl<S: MessageStore> DeliveryRouter<S> {
    pub fn new(store: Arc<S>, registry: Arc<SessionRegistry>, config: &GlobalConfig) -> Self {
        Self {
            store,
            registry,
            config: config.clone(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Send `body` from the user of `origin` to `receiver_id`.
    ///
    /// The sender is always `origin.user_id`. Fails with `EmptyMessage` or
    /// `MessageTooLong` before touching the store, and with `SendFailed` when
    /// the message could not be persisted. Push failures never fail the send;
    /// they show up as `PartiallyDelivered` in the receipt.
    pub async fn send(
        &self,
        origin: &Session,
        receiver_id: &UserId,
        body: &str,
    ) -> Result<SendReceipt, SendError> {
        let mut lifecycle = Lifecycle::new();

        if body.trim().is_empty() {
            debug!(session_id = %origin.session_id, "rejected empty message");
            return Err(SendError::EmptyMessage);
        }
        if body.len() > self.config.max_body_bytes {
            return Err(SendError::MessageTooLong {
                len: body.len(),
                max: self.config.max_body_bytes,
            });
        }

        let mut message = self
            .store
            .append(&origin.user_id, receiver_id, body)
            .await
            .map_err(|e| {
                warn!(
                    sender = %origin.user_id,
                    receiver = %receiver_id,
                    error = %e,
                    "failed to persist message"
                );
                SendError::SendFailed(e)
            })?;
        lifecycle.advance(DeliveryState::Persisted);

        let targets = self.targets(origin, receiver_id);
        lifecycle.advance(DeliveryState::Delivering);

        let event = ServerEvent::new_message(&message);
        let push_timeout = self.config.push_timeout();
        let pushes = targets.iter().map(|session_id| {
            let event = event.clone();
            async move {
                let result = self.registry.push(session_id, event, push_timeout).await;
                (*session_id, result)
            }
        });

        let mut pushed = Vec::with_capacity(targets.len());
        let mut failed = Vec::new();
        for (session_id, result) in join_all(pushes).await {
            match result {
                Ok(()) => pushed.push(session_id),
                Err(e) => {
                    debug!(%session_id, error = %e, "push failed");
                    failed.push(session_id);
                }
            }
        }

        if !pushed.is_empty() {
            message.delivered = self.record_deliveries(&message, &pushed).await;
        }

        let outcome = if failed.is_empty() {
            DeliveryState::Delivered
        } else {
            DeliveryState::PartiallyDelivered
        };
        lifecycle.advance(outcome);

        info!(
            conversation_id = %message.conversation_id,
            message_id = message.message_id,
            delivered = message.delivered.len(),
            failed = failed.len(),
            %outcome,
            "message routed"
        );

        Ok(SendReceipt {
            message,
            outcome,
            failed,
        })
    }

    /// History of the conversation between `viewer` and `peer`, with the
    /// limit clamped to the configured maximum.
    pub fn history_query(&self, viewer: &UserId, peer: &UserId, since: u64, limit: u32) -> HistoryQuery {
        HistoryQuery::new(
            ConversationId::between(viewer, peer),
            since,
            self.config.clamp_history_limit(limit),
        )
        .with_page_size(self.config.history_page_size)
    }

    fn targets(&self, origin: &Session, receiver_id: &UserId) -> BTreeSet<SessionId> {
        let mut targets: BTreeSet<SessionId> =
            self.registry.active_sessions(receiver_id).into_iter().collect();
        if receiver_id != &origin.user_id {
            targets.extend(self.registry.active_sessions(&origin.user_id));
        }
        targets.remove(&origin.session_id);
        targets
    }

    /// Record successful pushes. A store failure here is logged and the
    /// locally known set is returned instead; the message is already durable.
    async fn record_deliveries(&self, message: &Message, pushed: &[SessionId]) -> BTreeSet<SessionId> {
        match self
            .store
            .mark_delivered(&message.conversation_id, message.message_id, pushed)
            .await
        {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    conversation_id = %message.conversation_id,
                    message_id = message.message_id,
                    error = %e,
                    "failed to record deliveries"
                );
                message
                    .delivered
                    .iter()
                    .chain(pushed.iter())
                    .copied()
                    .collect()
            }
        }
    }
}

impl<S: MessageStore> std::fmt::Debug for DeliveryRouter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRouter")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
