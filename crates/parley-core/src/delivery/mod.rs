//! Delivery routing: persist a direct message, then fan it out to the live
//! sessions of both participants.

pub mod router;

pub use router::{DeliveryRouter, SendReceipt};
