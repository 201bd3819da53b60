//! The addressed wire envelope.
//!
//! Every protocol payload crosses the wire wrapped in an envelope carrying
//! the sender, the addressee, and the session id. The payload's `event` tag
//! is flattened into the same JSON object, so one frame looks like:
//!
//! ```json
//! {"to":"bob","from":"alice","session_id":"…","event":"qkd_bob_bases","bases":[…]}
//! ```
//!
//! Delivery ordering and exactly-once semantics are the channel's contract;
//! the protocol neither retransmits nor deduplicates.

use serde::{Deserialize, Serialize};

use qumail_core::Payload;

/// One addressed protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient identity.
    pub to: String,
    /// Sender identity.
    pub from: String,
    /// The key-agreement attempt this message belongs to.
    pub session_id: String,
    /// The protocol payload.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    /// Wrap a payload in an addressed envelope.
    pub fn new(to: &str, from: &str, session_id: &str, payload: Payload) -> Self {
        Self {
            to: to.to_owned(),
            from: from.to_owned(),
            session_id: session_id.to_owned(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qumail_core::message::VerdictStatus;
    use qumail_core::ProtocolVariant;

    #[test]
    fn test_envelope_json_is_flat() {
        let envelope = Envelope::new(
            "bob",
            "alice",
            "s-1",
            Payload::Initiate { protocol: ProtocolVariant::TwoState, symbols: vec![2, 0, 3] },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["to"], "bob");
        assert_eq!(json["from"], "alice");
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["event"], "qkd_initiate");
        assert_eq!(json["protocol"], "BB84");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::new(
            "alice",
            "bob",
            "s-2",
            Payload::HandshakeComplete { status: VerdictStatus::Success, qber: 0.04 },
        );
        let text = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, envelope);
    }
}
