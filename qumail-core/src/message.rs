//! Protocol message payloads.
//!
//! The six messages of the handshake, free of routing concerns: the async
//! layer wraps each payload in an addressed envelope before it crosses the
//! wire. The JSON encoding tags each payload with its `event` name.
//!
//! Ordering note: every payload a party sends is produced synchronously
//! inside the handler for the previous inbound payload, so per-session
//! ordering is enforced by construction, not by a sequencer.

use serde::{Deserialize, Serialize};

use crate::estimate::SampleEntry;
use crate::protocol::ProtocolVariant;

/// The responder's verdict on the error check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    /// QBER at or below the variant threshold; proceed to amplification.
    Success,
    /// QBER above the threshold; the session is rejected, no key exists.
    Failed,
}

/// One protocol message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Payload {
    /// Opening message: the initiator's public symbol stream.
    #[serde(rename = "qkd_initiate")]
    Initiate {
        /// Which protocol variant this session runs.
        protocol: ProtocolVariant,
        /// The encoded symbol stream, one symbol per prepared state.
        symbols: Vec<u8>,
    },

    /// The responder's measurement bases, announced after measuring.
    #[serde(rename = "qkd_bob_bases")]
    ResponderBases {
        /// Measurement bases, one per received symbol.
        bases: Vec<u8>,
        /// Measurement orientations; multi-factor only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orientations: Option<Vec<u8>>,
    },

    /// The initiator's preparation bases, announced after sifting.
    #[serde(rename = "qkd_alice_bases")]
    InitiatorBases {
        /// Preparation bases, one per transmitted symbol.
        bases: Vec<u8>,
        /// Preparation orientations; multi-factor only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orientations: Option<Vec<u8>>,
    },

    /// The initiator's disclosed error-check sample.
    #[serde(rename = "qkd_alice_sample")]
    InitiatorSample {
        /// Disclosed (sifted-key index, bit) pairs.
        sample: Vec<SampleEntry>,
    },

    /// The responder's verdict after checking the sample.
    #[serde(rename = "qkd_handshake_complete")]
    HandshakeComplete {
        /// Accept or reject.
        status: VerdictStatus,
        /// The measured QBER, reported either way.
        qber: f64,
    },

    /// The initiator's privacy-amplification seed.
    #[serde(rename = "qkd_pa_choice")]
    PaChoice {
        /// Public random seed, hex-encoded.
        seed: String,
    },
}

impl Payload {
    /// The payload's wire event name.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Initiate { .. } => "qkd_initiate",
            Self::ResponderBases { .. } => "qkd_bob_bases",
            Self::InitiatorBases { .. } => "qkd_alice_bases",
            Self::InitiatorSample { .. } => "qkd_alice_sample",
            Self::HandshakeComplete { .. } => "qkd_handshake_complete",
            Self::PaChoice { .. } => "qkd_pa_choice",
        }
    }
}
