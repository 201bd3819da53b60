//! In-process message bus.
//!
//! All parties attached to one bus see every envelope, exactly as they would
//! on the production relay's delivery side, and filter by addressee and
//! session id. Used by the test suite and by anything that wants to run both
//! roles inside one process.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::channel::MessageChannel;
use crate::error::HandshakeError;
use crate::message::Envelope;

const BUS_CAPACITY: usize = 256;

/// An in-process broadcast bus implementing [`MessageChannel`].
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
    connected: AtomicBool,
}

impl LocalBus {
    /// Create a connected bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx, connected: AtomicBool::new(true) }
    }

    /// Simulate losing the link. Subsequent sends fail with
    /// `ChannelUnavailable`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel for LocalBus {
    fn send(&self, envelope: Envelope) -> Result<(), HandshakeError> {
        if !self.is_connected() {
            return Err(HandshakeError::ChannelUnavailable);
        }
        // A bus with no subscribers simply drops the envelope, like a relay
        // with nobody on the other end.
        let _ = self.tx.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qumail_core::Payload;

    fn envelope() -> Envelope {
        Envelope::new("bob", "alice", "s", Payload::PaChoice { seed: "00".into() })
    }

    #[tokio::test]
    async fn test_subscribers_see_sends() {
        let bus = LocalBus::new();
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        bus.send(envelope()).unwrap();

        assert_eq!(rx_a.recv().await.unwrap(), envelope());
        assert_eq!(rx_b.recv().await.unwrap(), envelope());
    }

    #[tokio::test]
    async fn test_disconnected_bus_refuses_sends() {
        let bus = LocalBus::new();
        bus.disconnect();
        assert!(!bus.is_connected());
        assert_eq!(bus.send(envelope()), Err(HandshakeError::ChannelUnavailable));
    }

    #[test]
    fn test_send_without_subscribers_is_dropped() {
        let bus = LocalBus::new();
        assert_eq!(bus.send(envelope()), Ok(()));
    }
}
