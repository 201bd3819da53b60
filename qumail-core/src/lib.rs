//! QuMail QKD Protocol Core
//!
//! Software rendition of a quantum-key-distribution handshake between two
//! email peers. Two parties derive a bit-identical symmetric key without the
//! key ever crossing the wire, then detect intercept-resend tampering through
//! statistical error-rate analysis before the key may be used.
//!
//! This crate is sans-io: it contains only pure functions and the two
//! handshake state machines. Driving them over a real message channel is the
//! job of `qumail-handshake`.
//!
//! # Security Invariants
//!
//! - Private state vectors, sifted keys, and derived keys are zeroized on drop
//! - A QBER above the variant threshold is terminal; the key is discarded
//! - Malformed peer input aborts the session, never partial recovery
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod amplify;
pub mod cipher;
pub mod error;
pub mod estimate;
pub mod key;
pub mod measure;
pub mod message;
pub mod protocol;
pub mod session;
pub mod sift;
pub mod statevec;
pub mod symbol;

pub use error::ProtocolError;
pub use key::FinalKey;
pub use message::Payload;
pub use protocol::ProtocolVariant;
pub use session::{Initiator, Responder, Step};
