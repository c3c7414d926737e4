//! Session registry with per-session push mailboxes.
//!
//! The `SessionRegistry` is the runtime hub for live connections. Each
//! registered session gets a bounded `mpsc` mailbox; the transport task that
//! owns the connection drains the receiver and writes frames to the socket.
//! Many sessions may belong to one user (multi-device).
//!
//! Register/unregister touch only the entries of the session involved, so
//! connects and disconnects for different sessions never contend on a global
//! lock. Disconnect races are expected: every operation is idempotent.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_types::event::ServerEvent;
use parley_types::session::{Session, SessionId};
use parley_types::user::UserId;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Default buffer size for per-session mailboxes.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Errors that can occur while pushing an event to a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The session is not (or no longer) registered.
    #[error("session {0} is not connected")]
    NotConnected(SessionId),

    /// The connection task dropped its receiver.
    #[error("mailbox closed for session {0}")]
    Closed(SessionId),

    /// The mailbox stayed full for the whole push timeout.
    #[error("push to session {0} timed out after {1:?}")]
    TimedOut(SessionId, Duration),
}

struct SessionEntry {
    session: Session,
    mailbox: mpsc::Sender<ServerEvent>,
}

/// Tracks which live sessions belong to which user.
pub struct SessionRegistry {
    /// session_id -> session metadata + mailbox sender.
    sessions: DashMap<SessionId, SessionEntry>,
    /// user_id -> ids of that user's live sessions.
    by_user: DashMap<UserId, HashSet<SessionId>>,
    mailbox_capacity: usize,
}

impl SessionRegistry {
    /// Create an empty registry whose mailboxes hold `mailbox_capacity` events.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    /// Allocate a fresh session id for `user_id` and register it.
    pub fn connect(&self, user_id: UserId) -> (Session, mpsc::Receiver<ServerEvent>) {
        loop {
            let session_id = SessionId::new();
            if let Some(rx) = self.register(user_id.clone(), session_id) {
                let session = self
                    .session(&session_id)
                    .unwrap_or_else(|| Session::new(session_id, user_id.clone()));
                return (session, rx);
            }
        }
    }

    /// Add `session_id` under `user_id`.
    ///
    /// Returns the session's mailbox receiver when newly registered, or `None`
    /// if the session was already present (a no-op, not an error).
    pub fn register(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Option<mpsc::Receiver<ServerEvent>> {
        let rx = match self.sessions.entry(session_id) {
            Entry::Occupied(_) => {
                debug!(%session_id, "session already registered");
                return None;
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.mailbox_capacity);
                slot.insert(SessionEntry {
                    session: Session::new(session_id, user_id.clone()),
                    mailbox: tx,
                });
                rx
            }
        };

        self.by_user
            .entry(user_id.clone())
            .or_default()
            .insert(session_id);
        debug!(%user_id, %session_id, "registered session");
        Some(rx)
    }

    /// Remove a session. Returns `true` if it was registered.
    ///
    /// Dropping the mailbox sender lets the connection task observe closure.
    pub fn unregister(&self, session_id: &SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return false;
        };
        let user_id = entry.session.user_id;

        if let Some(mut ids) = self.by_user.get_mut(&user_id) {
            ids.remove(session_id);
        }
        self.by_user.remove_if(&user_id, |_, ids| ids.is_empty());

        debug!(%user_id, %session_id, "unregistered session");
        true
    }

    /// Ids of the user's live sessions. Empty when the user is offline.
    pub fn active_sessions(&self, user_id: &UserId) -> HashSet<SessionId> {
        self.by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| self.sessions.contains_key(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Metadata of a live session.
    pub fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.get(session_id).map(|e| e.session.clone())
    }

    /// Enqueue `event` into the session's mailbox, waiting at most `timeout`
    /// for capacity.
    pub async fn push(
        &self,
        session_id: &SessionId,
        event: ServerEvent,
        timeout: Duration,
    ) -> Result<(), PushError> {
        // Clone the sender so no shard guard is held across the await.
        let mailbox = self
            .sessions
            .get(session_id)
            .map(|e| e.mailbox.clone())
            .ok_or(PushError::NotConnected(*session_id))?;

        mailbox
            .send_timeout(event, timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => {
                    PushError::TimedOut(*session_id, timeout)
                }
                mpsc::error::SendTimeoutError::Closed(_) => PushError::Closed(*session_id),
            })
    }

    /// Number of live sessions across all users.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of users with at least one live session.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("users", &self.by_user.len())
            .field("mailbox_capacity", &self.mailbox_capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[test]
    fn register_and_lookup() {
        let registry = SessionRegistry::default();
        let s1 = SessionId::new();
        let s2 = SessionId::new();

        assert!(registry.register(uid("alice"), s1).is_some());
        assert!(registry.register(uid("alice"), s2).is_some());

        let active = registry.active_sessions(&uid("alice"));
        assert_eq!(active, HashSet::from([s1, s2]));
        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn duplicate_register_is_noop() {
        let registry = SessionRegistry::default();
        let sid = SessionId::new();

        assert!(registry.register(uid("alice"), sid).is_some());
        assert!(registry.register(uid("alice"), sid).is_none());
        // Re-registering under another user does not steal the session.
        assert!(registry.register(uid("bob"), sid).is_none());

        assert_eq!(registry.active_sessions(&uid("alice")).len(), 1);
        assert!(registry.active_sessions(&uid("bob")).is_empty());
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SessionRegistry::default();
        let sid = SessionId::new();
        registry.register(uid("alice"), sid);

        assert!(registry.unregister(&sid));
        assert!(!registry.unregister(&sid));
        assert!(registry.active_sessions(&uid("alice")).is_empty());
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn unregister_unknown_session_is_silent() {
        let registry = SessionRegistry::default();
        assert!(!registry.unregister(&SessionId::new()));
    }

    #[test]
    fn offline_user_has_no_sessions() {
        let registry = SessionRegistry::default();
        assert!(registry.active_sessions(&uid("ghost")).is_empty());
    }

    #[test]
    fn unregister_keeps_other_devices() {
        let registry = SessionRegistry::default();
        let phone = SessionId::new();
        let laptop = SessionId::new();
        registry.register(uid("alice"), phone);
        registry.register(uid("alice"), laptop);

        registry.unregister(&phone);
        assert_eq!(
            registry.active_sessions(&uid("alice")),
            HashSet::from([laptop])
        );
        assert_eq!(registry.user_count(), 1);
    }

    #[tokio::test]
    async fn connect_allocates_session() {
        let registry = SessionRegistry::default();
        let (session, _rx) = registry.connect(uid("alice"));
        assert_eq!(session.user_id, uid("alice"));
        assert!(registry.active_sessions(&uid("alice")).contains(&session.session_id));
    }

    #[tokio::test]
    async fn push_reaches_mailbox() {
        let registry = SessionRegistry::default();
        let (session, mut rx) = registry.connect(uid("bob"));

        registry
            .push(&session.session_id, ServerEvent::Pong, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Pong);
    }

    #[tokio::test]
    async fn push_to_unknown_session_errors() {
        let registry = SessionRegistry::default();
        let sid = SessionId::new();
        let err = registry
            .push(&sid, ServerEvent::Pong, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, PushError::NotConnected(sid));
    }

    #[tokio::test]
    async fn push_to_dropped_receiver_errors() {
        let registry = SessionRegistry::default();
        let (session, rx) = registry.connect(uid("bob"));
        drop(rx);

        let err = registry
            .push(&session.session_id, ServerEvent::Pong, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, PushError::Closed(session.session_id));
    }

    #[tokio::test]
    async fn push_to_full_mailbox_times_out() {
        let registry = SessionRegistry::new(1);
        let (session, _rx) = registry.connect(uid("bob"));
        let timeout = Duration::from_millis(20);

        registry
            .push(&session.session_id, ServerEvent::Pong, timeout)
            .await
            .unwrap();
        let err = registry
            .push(&session.session_id, ServerEvent::Pong, timeout)
            .await
            .unwrap_err();
        assert_eq!(err, PushError::TimedOut(session.session_id, timeout));
    }

    #[tokio::test]
    async fn concurrent_connects_and_disconnects() {
        let registry = Arc::new(SessionRegistry::default());
        let mut handles = Vec::new();

        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let user = uid(if i % 2 == 0 { "even" } else { "odd" });
                let (session, _rx) = registry.connect(user);
                if i % 4 == 0 {
                    registry.unregister(&session.session_id);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(registry.session_count(), 24);
        assert_eq!(
            registry.active_sessions(&uid("even")).len()
                + registry.active_sessions(&uid("odd")).len(),
            24
        );
    }

    #[test]
    fn debug_impl() {
        let registry = SessionRegistry::default();
        let debug = format!("{registry:?}");
        assert!(debug.contains("SessionRegistry"));
        assert!(debug.contains("mailbox_capacity"));
    }
}
