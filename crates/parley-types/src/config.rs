//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml` that tunes delivery
//! timeouts, mailbox sizes, history paging and message limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the delivery core.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Upper bound on a single push to one session, in milliseconds.
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    /// Outbound events buffered per session before pushes start waiting.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Rows fetched per page when streaming history.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Hard cap on the `limit` of a single history request.
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: u32,

    /// Maximum message body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_push_timeout_ms() -> u64 {
    2_000
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_history_page_size() -> u32 {
    100
}

fn default_max_history_limit() -> u32 {
    500
}

fn default_max_body_bytes() -> usize {
    4_096
}

impl GlobalConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Cap a requested history limit at `max_history_limit`. Zero stays zero.
    pub fn clamp_history_limit(&self, requested: u32) -> u32 {
        requested.min(self.max_history_limit)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: default_push_timeout_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            history_page_size: default_history_page_size(),
            max_history_limit: default_max_history_limit(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
