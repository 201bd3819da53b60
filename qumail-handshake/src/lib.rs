//! QuMail Handshake
//!
//! The async layer that drives the `qumail-core` state machines over a real
//! message channel. It owns everything the sans-io engine deliberately does
//! not: the channel abstraction, the addressed wire envelope, the session
//! registry, and the two driver entry points callers await for a final key.
//!
//! # Session Invariants
//!
//! - Exactly one live driver per session id per registry; duplicates are
//!   refused, not raced
//! - Envelopes from the wrong peer or session are silently discarded
//! - Listeners detach exactly once, when the driver returns (any outcome)
//! - A rejected or abandoned session leaves no key material behind
//! - No internal timeouts or retries; both are caller concerns, retries
//!   with a fresh session id

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod channel;
pub mod error;
pub mod local;
pub mod manager;
pub mod message;
pub mod registry;
pub mod ws;

pub use channel::MessageChannel;
pub use error::HandshakeError;
pub use local::LocalBus;
pub use manager::{start_as_initiator, start_as_responder, HandshakeOptions};
pub use message::Envelope;
pub use registry::SessionRegistry;
pub use ws::WsChannel;
