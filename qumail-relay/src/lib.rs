//! QuMail signaling relay.
//!
//! Routes addressed JSON envelopes between connected users. The relay never
//! inspects a frame beyond its `event` and `to` fields: handshake payloads
//! pass through verbatim. An undeliverable `qkd_initiate` is held and
//! flushed when its recipient joins, so a handshake can open against a peer
//! who is currently offline; any other undeliverable event is dropped, since
//! the session it belongs to cannot proceed without its peer anyway.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Outbound queue depth per connection.
const MAX_QUEUE_DEPTH: usize = 32;

/// Stored initiations per offline recipient.
const MAX_PENDING_PER_USER: usize = 8;

/// The event name whose frames are stored for offline recipients.
const INITIATE_EVENT: &str = "qkd_initiate";

type UserMap = Arc<DashMap<String, mpsc::Sender<String>>>;
type PendingMap = Arc<DashMap<String, Vec<String>>>;

#[derive(Deserialize)]
struct JoinFrame {
    event: String,
    user_id: String,
}

#[derive(Deserialize)]
struct RouteInfo {
    event: String,
    #[serde(default)]
    to: Option<String>,
}

/// Run the relay on an already-bound listener. Never returns under normal
/// operation.
pub async fn run_relay(listener: TcpListener) {
    let users: UserMap = Arc::new(DashMap::new());
    let pending: PendingMap = Arc::new(DashMap::new());

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let users = users.clone();
        let pending = pending.clone();
        tokio::spawn(async move {
            debug!(%peer_addr, "connection accepted");
            if let Err(e) = handle_connection(stream, users, pending).await {
                debug!(%peer_addr, error = %e, "connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    users: UserMap,
    pending: PendingMap,
) -> Result<(), Box<dyn std::error::Error>> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // 1. First frame must be a join.
    let user_id = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<JoinFrame>(&text) {
                Ok(join) if join.event == "join" && !join.user_id.is_empty() => {
                    break join.user_id;
                }
                _ => {
                    let _ = ws_tx
                        .send(Message::Text(
                            r#"{"event":"error","code":"invalid_join"}"#.into(),
                        ))
                        .await;
                    return Ok(());
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return Ok(()),
        }
    };

    // 2. Register. One live connection per identity.
    let (tx, mut rx) = mpsc::channel::<String>(MAX_QUEUE_DEPTH);
    {
        use dashmap::mapref::entry::Entry;
        match users.entry(user_id.clone()) {
            Entry::Occupied(_) => {
                warn!(%user_id, "join refused: identity already online");
                let _ = ws_tx
                    .send(Message::Text(r#"{"event":"error","code":"user_taken"}"#.into()))
                    .await;
                return Ok(());
            }
            Entry::Vacant(entry) => {
                entry.insert(tx.clone());
            }
        }
    }
    info!(%user_id, "user joined");

    // Writer task owns the sink.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(r#"{"event":"joined"}"#.to_owned()).await;

    // 3. Flush initiations stored while this user was offline.
    if let Some((_, stored)) = pending.remove(&user_id) {
        info!(%user_id, count = stored.len(), "delivering stored initiations");
        for frame in stored {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    }

    // 4. Route loop.
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let route = match serde_json::from_str::<RouteInfo>(&text) {
            Ok(route) => route,
            Err(_) => {
                debug!(%user_id, "dropping unparseable frame");
                continue;
            }
        };
        let Some(recipient) = route.to else {
            debug!(%user_id, event = %route.event, "dropping unaddressed frame");
            continue;
        };

        if let Some(peer_tx) = users.get(&recipient) {
            if peer_tx.try_send(text).is_err() {
                warn!(%user_id, %recipient, "recipient queue full, frame dropped");
            }
        } else if route.event == INITIATE_EVENT {
            let mut stored = pending.entry(recipient.clone()).or_default();
            if stored.len() < MAX_PENDING_PER_USER {
                info!(%user_id, %recipient, "recipient offline, storing initiation");
                stored.push(text);
            } else {
                warn!(%user_id, %recipient, "pending queue full, initiation dropped");
            }
        } else {
            debug!(
                %user_id,
                %recipient,
                event = %route.event,
                "recipient offline, frame dropped"
            );
        }
    }

    // 5. Cleanup on disconnect.
    users.remove(&user_id);
    info!(%user_id, "user left");
    Ok(())
}
