use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::warn;
use uuid::Uuid;

use super::storage::WsStorage;

/// Sends a push to a single connection. Swallowed send errors are expected —
/// the connection's read loop will observe the closed socket and clean up.
pub async fn send_to(storage: &WsStorage, conn_id: Uuid, text: String) {
    let Some(conn) = storage.get(conn_id) else {
        return;
    };
    let mut guard = conn.sender.lock().await;
    if let Err(err) = guard.send(Message::text(text)).await {
        warn!(?conn_id, %err, "failed to send ws message");
    }
}

/// Sends a push to every member of `conn_ids`, optionally skipping one
/// (the usual "broadcast excluding self" pattern).
pub async fn broadcast(storage: &WsStorage, conn_ids: &[Uuid], text: &str, exclude: Option<Uuid>) {
    for &conn_id in conn_ids {
        if Some(conn_id) == exclude {
            continue;
        }
        send_to(storage, conn_id, text.to_string()).await;
    }
}
