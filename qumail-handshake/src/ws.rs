//! WebSocket channel to the signaling relay.
//!
//! Speaks the `qumail-relay` protocol: one JSON object per text frame. The
//! first frame is a join announcing our identity; the relay answers
//! `{"event":"joined"}` (or an error, e.g. the identity is already online)
//! and from then on delivers addressed envelopes verbatim.
//!
//! A writer task owns the sink and drains an unbounded outbound queue; a
//! reader task parses inbound frames and fans them out to subscribers.
//! Frames that are not envelopes (relay notices, junk) are dropped with a
//! debug line. Socket loss flips `is_connected` so later sends fail fast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::debug;

use crate::channel::MessageChannel;
use crate::error::HandshakeError;
use crate::message::Envelope;

const FANOUT_CAPACITY: usize = 256;

/// A relay-backed [`MessageChannel`] for one user identity.
pub struct WsChannel {
    user_id: String,
    out_tx: mpsc::UnboundedSender<Envelope>,
    in_tx: broadcast::Sender<Envelope>,
    /// Receiver created before the reader task starts, handed to the first
    /// subscriber so a frame the relay delivers immediately after the join
    /// acknowledgment (e.g. a stored-and-forwarded initiate) cannot be lost.
    first_rx: Mutex<Option<broadcast::Receiver<Envelope>>>,
    connected: Arc<AtomicBool>,
}

impl WsChannel {
    /// Connect to a relay and join as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelUnavailable` when the socket cannot be established
    /// or the relay refuses the join.
    pub async fn connect(url: &str, user_id: &str) -> Result<Self, HandshakeError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|_| HandshakeError::ChannelUnavailable)?;
        let (mut sink, mut stream) = ws.split();

        let join = serde_json::json!({ "event": "join", "user_id": user_id }).to_string();
        sink.send(WsMessage::Text(join))
            .await
            .map_err(|_| HandshakeError::ChannelUnavailable)?;

        // Wait for the relay's verdict on the join before handing the
        // socket to the background tasks.
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let value: serde_json::Value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    match value.get("event").and_then(|e| e.as_str()) {
                        Some("joined") => break,
                        Some("error") => return Err(HandshakeError::ChannelUnavailable),
                        _ => continue,
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Err(HandshakeError::ChannelUnavailable),
            }
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
        let (in_tx, first_rx) = broadcast::channel(FANOUT_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        // Writer task: owns the sink. When the channel handle is dropped the
        // queue ends; a best-effort close frame lets the relay free the
        // identity promptly.
        let writer_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(WsMessage::Close(None)).await;
            writer_connected.store(false, Ordering::SeqCst);
        });

        // Reader task: owns the stream, fans envelopes out.
        let reader_tx = in_tx.clone();
        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => {
                            let _ = reader_tx.send(envelope);
                        }
                        Err(_) => debug!("dropping non-envelope relay frame"),
                    },
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            user_id: user_id.to_owned(),
            out_tx,
            in_tx,
            first_rx: Mutex::new(Some(first_rx)),
            connected,
        })
    }

    /// The identity this channel joined as.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl MessageChannel for WsChannel {
    fn send(&self, envelope: Envelope) -> Result<(), HandshakeError> {
        if !self.is_connected() {
            return Err(HandshakeError::ChannelUnavailable);
        }
        self.out_tx.send(envelope).map_err(|_| HandshakeError::ChannelClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        let stashed = self.first_rx.lock().ok().and_then(|mut slot| slot.take());
        match stashed {
            Some(rx) => rx,
            None => self.in_tx.subscribe(),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
