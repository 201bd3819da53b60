//! Handshake errors.
//!
//! Everything here surfaces through the driver's return value; nothing is
//! retried internally and no handshake state survives a failure. A security
//! rejection is never downgraded to a weaker protocol or a partial key.

use std::fmt;

use qumail_core::ProtocolError;

/// Errors a handshake driver can return.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeError {
    /// The measured QBER exceeded the variant threshold. The only expected
    /// protocol-level failure; the session's key is discarded, never
    /// downgraded into a partial one.
    SecurityRejection {
        /// The measured error rate.
        qber: f64,
        /// The variant's acceptance threshold.
        threshold: f64,
    },

    /// A received message was structurally unacceptable (missing data,
    /// inconsistent lengths). The session is aborted, not recovered.
    MalformedMessage(ProtocolError),

    /// The channel was not connected at handshake start. Raised before any
    /// private material is generated.
    ChannelUnavailable,

    /// The channel closed mid-handshake. The session is abandoned; no key
    /// is produced or cached.
    ChannelClosed,

    /// A driver was started for a session id that is already live. A caller
    /// bug; the new driver is refused rather than racing the existing one.
    DuplicateSession(String),

    /// The driver was invoked with unusable options or an opening message
    /// of the wrong type.
    InvalidCall(ProtocolError),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecurityRejection { qber, threshold } => write!(
                f,
                "security rejection: qber {:.2}% exceeds threshold {:.0}%",
                qber * 100.0,
                threshold * 100.0
            ),
            Self::MalformedMessage(e) => write!(f, "malformed message: {}", e),
            Self::ChannelUnavailable => write!(f, "channel unavailable"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::DuplicateSession(id) => write!(f, "duplicate session: {}", id),
            Self::InvalidCall(e) => write!(f, "invalid call: {}", e),
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<ProtocolError> for HandshakeError {
    fn from(e: ProtocolError) -> Self {
        Self::MalformedMessage(e)
    }
}
