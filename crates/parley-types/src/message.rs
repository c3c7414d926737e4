//! Direct-message domain types.
//!
//! A `Message` belongs to exactly one `ConversationId`, the unordered pair of
//! its two participants. Message ids are assigned per conversation, start at
//! 1 and increase by one without gaps.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidConversationId;
use crate::session::SessionId;
use crate::user::UserId;

/// Separator between the two participants. Never valid inside a `UserId`.
const PAIR_SEPARATOR: char = '~';

/// Key of a direct conversation: the unordered pair `(a, b)`.
///
/// Rendered as `"<lower>~<higher>"` so both participants derive the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId {
    lo: UserId,
    hi: UserId,
}

impl ConversationId {
    /// Derive the conversation key for two participants (order-insensitive).
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self {
            lo: lo.clone(),
            hi: hi.clone(),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PAIR_SEPARATOR}{}", self.lo, self.hi)
    }
}

impl FromStr for ConversationId {
    type Err = InvalidConversationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s
            .split_once(PAIR_SEPARATOR)
            .ok_or(InvalidConversationId::MissingSeparator)?;
        let lo = UserId::parse(lo).map_err(InvalidConversationId::Participant)?;
        let hi = UserId::parse(hi).map_err(InvalidConversationId::Participant)?;
        if lo > hi {
            return Err(InvalidConversationId::NotCanonical);
        }
        Ok(Self::between(&lo, &hi))
    }
}

impl TryFrom<String> for ConversationId {
    type Error = InvalidConversationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.to_string()
    }
}

/// A persisted direct message.
///
/// Immutable once persisted, except for `delivered`, which only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic per conversation, starting at 1.
    pub message_id: u64,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Sessions this message was successfully pushed to.
    #[serde(default)]
    pub delivered: BTreeSet<SessionId>,
}

/// Lifecycle of a single send request inside the delivery router.
///
/// `Received -> Persisted -> Delivering -> Delivered | PartiallyDelivered`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Received,
    Persisted,
    Delivering,
    /// Every resolved session accepted the push (vacuously true with none).
    Delivered,
    /// At least one resolved session could not be reached in time.
    PartiallyDelivered,
}

impl DeliveryState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Received, Persisted)
                | (Persisted, Delivering)
                | (Delivering, Delivered)
                | (Delivering, PartiallyDelivered)
        )
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Received => write!(f, "received"),
            DeliveryState::Persisted => write!(f, "persisted"),
            DeliveryState::Delivering => write!(f, "delivering"),
            DeliveryState::Delivered => write!(f, "delivered"),
            DeliveryState::PartiallyDelivered => write!(f, "partially_delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn test_conversation_id_is_order_insensitive() {
        let a = uid("alice");
        let b = uid("bob");
        assert_eq!(ConversationId::between(&a, &b), ConversationId::between(&b, &a));
        assert_eq!(ConversationId::between(&a, &b).to_string(), "alice~bob");
    }

    #[test]
    fn test_conversation_id_sorts_participants() {
        let conv = ConversationId::between(&uid("zed"), &uid("amy"));
        assert_eq!(conv.to_string(), "amy~zed");
    }

    #[test]
    fn test_conversation_id_parse() {
        let conv: ConversationId = "alice~bob".parse().unwrap();
        assert_eq!(conv, ConversationId::between(&uid("bob"), &uid("alice")));

        assert_eq!(
            "alicebob".parse::<ConversationId>(),
            Err(InvalidConversationId::MissingSeparator)
        );
        assert_eq!(
            "bob~alice".parse::<ConversationId>(),
            Err(InvalidConversationId::NotCanonical)
        );
        assert!("alice~".parse::<ConversationId>().is_err());
    }

    #[test]
    fn test_self_conversation() {
        let a = uid("solo");
        let conv = ConversationId::between(&a, &a);
        assert_eq!(conv.to_string(), "solo~solo");
        assert_eq!("solo~solo".parse::<ConversationId>().unwrap(), conv);
    }

    #[test]
    fn test_delivery_state_transitions() {
        use DeliveryState::*;
        assert!(Received.can_advance_to(Persisted));
        assert!(Persisted.can_advance_to(Delivering));
        assert!(Delivering.can_advance_to(Delivered));
        assert!(Delivering.can_advance_to(PartiallyDelivered));
        assert!(!Received.can_advance_to(Delivering));
        assert!(!Delivered.can_advance_to(Delivering));
        assert!(!Delivered.can_advance_to(PartiallyDelivered));
    }

    #[test]
    fn test_message_serializes_delivered_set() {
        let msg = Message {
            message_id: 1,
            conversation_id: ConversationId::between(&uid("a"), &uid("b")),
            sender_id: uid("a"),
            receiver_id: uid("b"),
            body: "hi".to_string(),
            created_at: Utc::now(),
            delivered: BTreeSet::from([SessionId::new()]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversation_id"], "a~b");
        assert_eq!(json["delivered"].as_array().unwrap().len(), 1);
    }
}
