use thiserror::Error;

/// Reasons a raw string is not a valid `UserId`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidUserId {
    #[error("user id is empty")]
    Empty,

    #[error("user id is {0} characters long (max 32)")]
    TooLong(usize),

    #[error("user id contains invalid character '{0}'")]
    InvalidChar(char),
}

/// Reasons a raw string is not a valid `ConversationId`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidConversationId {
    #[error("conversation id must be '<user>~<user>'")]
    MissingSeparator,

    #[error("invalid participant: {0}")]
    Participant(InvalidUserId),

    #[error("participants must be in ascending order")]
    NotCanonical,
}

/// Errors from the message store.
///
/// `StorageUnavailable` means the durable backing store could not be read or
/// written; a failed `append` means the message was not persisted.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: String,
        message_id: u64,
    },

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Errors surfaced to the sender of a direct message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message body is empty")]
    EmptyMessage,

    #[error("message body is {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("send failed: {0}")]
    SendFailed(#[source] StoreError),
}

impl SendError {
    /// Stable machine-readable code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            SendError::EmptyMessage => "EMPTY_MESSAGE",
            SendError::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            SendError::SendFailed(_) => "SEND_FAILED",
        }
    }

    /// Whether the sender can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SendError::SendFailed(_))
    }
}

/// Errors from account registration, login and token checks.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("please fill all fields")]
    MissingField,

    #[error("invalid username: {0}")]
    InvalidUserId(#[from] InvalidUserId),

    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("wrong username or password")]
    InvalidCredentials,

    #[error("invalid or revoked token")]
    InvalidToken,

    #[error("password hashing failed")]
    Hashing,

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query error: {0}")]
    Query(String),

    #[error("conflict: {0}")]
    Conflict(String),
}
