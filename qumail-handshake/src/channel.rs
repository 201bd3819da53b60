//! The message channel abstraction.
//!
//! The drivers only need three things from a transport: fire an envelope at
//! the peer, watch the inbound stream, and know whether the link is up.
//! Anything that can do that can carry a handshake — the in-process bus in
//! `local` for tests and demos, the WebSocket client in `ws` for the
//! production relay.

use tokio::sync::broadcast;

use crate::error::HandshakeError;
use crate::message::Envelope;

/// A bidirectional, addressed message channel.
///
/// Subscribing replaces an event-emitter's `on`; dropping the returned
/// receiver is the `off`. Every subscriber sees every inbound envelope and
/// filters for itself, which is what keeps concurrent sessions on one
/// channel independent.
pub trait MessageChannel: Send + Sync {
    /// Transmit an envelope toward its addressee.
    ///
    /// # Errors
    ///
    /// Returns `ChannelUnavailable` if the link is down, `ChannelClosed` if
    /// it went away underneath us.
    fn send(&self, envelope: Envelope) -> Result<(), HandshakeError>;

    /// Watch the inbound stream. Each subscriber receives every envelope
    /// delivered after the call.
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;
}
