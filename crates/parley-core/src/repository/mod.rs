//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (parley-infra) implements. The core crate never depends on any specific
//! storage technology; `memory` holds in-process implementations.

pub mod account;
pub mod memory;
pub mod message;
