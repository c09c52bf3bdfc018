use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── Events ───────────────────────────────────────────────────────────

/// Board mutations pushed to every connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    ProjectCreated { project: Project },
    ProjectUpdated { project: Project },
    EpicCreated { epic: Epic },
    EpicUpdated { epic: Epic },
    EpicDeleted { epic_id: i64 },
    StoryCreated { story: Story },
    StoryUpdated { story: Story },
    StoryDeleted { story_id: i64 },
    CardCreated { card: Card },
    CardUpdated { card: Card },
    CardMoved {
        card_id: i64,
        from_status: ItemStatus,
        to_status: ItemStatus,
    },
    CardDeleted { card_id: i64 },
    CommentAdded { comment: Comment },
    NotificationCreated { notification: Notification },
    SprintCreated { sprint: Sprint },
    SprintUpdated { sprint: Sprint },
    SprintDeleted { sprint_id: i64 },
    MindMapSaved { project_id: i64 },
    UserUpdated { user: User },
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    tx: broadcast::Sender<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tx))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<String>) {
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    tracing::debug!(clients = tx.receiver_count(), "WebSocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("WebSocket client disconnected");
}

/// Forward broadcasts to one client, pinging every [`PING_INTERVAL`] and
/// dropping the connection when no Pong arrives within [`PONG_TIMEOUT`].
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagging, events dropped");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

/// Serialize and broadcast to all connected clients. No receivers is fine.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_moved_serialization() {
        let msg = WsMessage::CardMoved {
            card_id: 5,
            from_status: ItemStatus::Todo,
            to_status: ItemStatus::InProgress,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CardMoved\""));
        assert!(json.contains("\"card_id\":5"));
        assert!(json.contains("\"to_status\":\"in_progress\""));
    }

    #[test]
    fn test_card_deleted_serialization() {
        let json = serde_json::to_value(WsMessage::CardDeleted { card_id: 42 }).unwrap();
        assert_eq!(json["type"], "CardDeleted");
        assert_eq!(json["data"]["card_id"], 42);
    }

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        broadcast_message(&tx, &WsMessage::SprintDeleted { sprint_id: 3 });
        let raw = rx.try_recv().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["type"], "SprintDeleted");
    }

    #[test]
    fn test_broadcast_without_receivers_is_silent() {
        let (tx, rx) = broadcast::channel::<String>(4);
        drop(rx);
        broadcast_message(&tx, &WsMessage::MindMapSaved { project_id: 1 });
    }
}
