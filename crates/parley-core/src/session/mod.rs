//! Live session tracking.
//!
//! - `registry` -- `SessionRegistry` mapping users to their connected sessions,
//!   with a bounded push mailbox per session.

pub mod registry;

pub use registry::{PushError, SessionRegistry};
