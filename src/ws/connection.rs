//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single admitted connection: applies
//! control messages through the registry, writes frames from the
//! connection's outbound queue and runs the ping/idle heartbeat.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};

use super::messages::{ClientMessage, ServerReply};
use crate::app_state::AppState;
use crate::domain::{ConnectionHandle, ConnectionRegistry, OutboundQueue};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads control messages from the client and acknowledges them.
/// - Writes frames queued by the broadcast hub while the connection is
///   `Active`; once the registry has closed it, queued frames are dropped.
/// - Evicts the connection after `idle_timeout` without inbound traffic.
///
/// The connection is always deregistered on exit.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    handle: ConnectionHandle,
    mut outbound: OutboundQueue,
) {
    let registry = &state.registry;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let welcome = ServerReply::Welcome {
        connection_id: handle.id().to_string(),
    };
    if send_reply(&mut ws_tx, &welcome).await {
        let mut heartbeat = tokio::time::interval(state.ws.ping_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                // Incoming message from client
                msg = ws_rx.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    registry.touch(&handle).await;
                    match msg {
                        Message::Text(text) => {
                            let reply = handle_text_message(registry, &handle, text.as_str()).await;
                            if !send_reply(&mut ws_tx, &reply).await {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                // Frame queued by the broadcast hub
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if !handle.is_active() {
                        break;
                    }
                    if ws_tx.send(Message::text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    let idle = registry.idle_for(&handle).await;
                    if idle.is_none_or(|idle| idle >= state.ws.idle_timeout) {
                        tracing::info!(connection_id = %handle.id(), "evicting idle connection");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    registry.mark_closing(&handle).await;
    let _ = ws_tx.close().await;
    registry.deregister(&handle).await;
    tracing::debug!(connection_id = %handle.id(), "ws connection closed");
}

/// Writes `reply` as a text frame. A reply that cannot be encoded is
/// skipped. Returns `false` only when the socket write fails.
async fn send_reply<S>(sink: &mut S, reply: &ServerReply) -> bool
where
    S: Sink<Message> + Unpin,
{
    match reply.to_text() {
        Some(text) => sink.send(Message::text(text)).await.is_ok(),
        None => true,
    }
}

/// Applies one control message and returns the reply to send.
async fn handle_text_message(
    registry: &ConnectionRegistry,
    handle: &ConnectionHandle,
    text: &str,
) -> ServerReply {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { match_id }) => {
            registry.subscribe(handle, match_id).await;
            ServerReply::Subscribed { match_id }
        }
        Ok(ClientMessage::Unsubscribe { match_id }) => {
            registry.unsubscribe(handle, match_id).await;
            ServerReply::Unsubscribed { match_id }
        }
        Err(e) => ServerReply::Error {
            message: format!("invalid control message: {e}"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{MatchId, Topic};

    async fn active(registry: &ConnectionRegistry) -> ConnectionHandle {
        let Ok((handle, _rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert!(registry.activate(&handle).await);
        handle
    }

    #[tokio::test]
    async fn subscribe_message_updates_registry() {
        let registry = ConnectionRegistry::new(4);
        let handle = active(&registry).await;

        let reply = handle_text_message(&registry, &handle, r#"{"type":"subscribe","matchId":4}"#).await;
        assert_eq!(
            reply,
            ServerReply::Subscribed {
                match_id: Topic::Match(MatchId::new(4))
            }
        );

        let mut seen = 0;
        let seq = registry.next_event_seq();
        registry
            .for_each_subscriber(Topic::Match(MatchId::new(4)), seq, |_| seen += 1)
            .await;
        assert_eq!(seen, 1);

        let reply =
            handle_text_message(&registry, &handle, r#"{"type":"unsubscribe","matchId":"4"}"#).await;
        assert!(matches!(reply, ServerReply::Unsubscribed { .. }));
        let mut seen = 0;
        let seq = registry.next_event_seq();
        registry
            .for_each_subscriber(Topic::Match(MatchId::new(4)), seq, |_| seen += 1)
            .await;
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn malformed_message_gets_error_reply() {
        let registry = ConnectionRegistry::new(4);
        let handle = active(&registry).await;
        let reply = handle_text_message(&registry, &handle, "not json").await;
        assert!(matches!(reply, ServerReply::Error { .. }));
    }
}
