//! Downstream WebSocket endpoint.
//!
//! Each accepted socket gets a hub registration and a select loop that
//! drains the hub queue into the socket while parsing filter commands off
//! the read half. Either half failing tears the whole connection down and
//! unregisters the subscriber.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::api::AppState;
use crate::hub::SubscriberHub;
use crate::protocol::{ClientMessage, ServerMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut queue) = state.hub.register();
    let (mut sink, mut stream) = socket.split();

    // Greeting goes out before anything the hub may queue.
    let greeting = ServerMessage::Connected { timestamp: Utc::now() };
    if send_message(&mut sink, &greeting).await.is_err() {
        state.hub.unregister(id);
        return;
    }

    loop {
        tokio::select! {
            queued = queue.recv() => match queued {
                Some(msg) => {
                    if send_message(&mut sink, &msg).await.is_err() {
                        break;
                    }
                }
                // The hub evicted us (send failure observed elsewhere).
                None => break,
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&state.hub, id, &text);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            },
        }
    }

    state.hub.unregister(id);
    debug!(subscriber = id, "websocket closed");
}

async fn send_message(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).expect("server message serializes");
    sink.send(Message::Text(json)).await
}

/// Apply one client frame. Frames that don't parse as a known message are
/// ignored.
fn handle_client_message(hub: &SubscriberHub, id: u64, text: &str) {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        return;
    };
    match msg {
        ClientMessage::Subscribe { chains } => {
            let mut acked: Vec<u64> = chains.clone();
            acked.sort_unstable();
            acked.dedup();
            hub.set_filter(id, Some(chains.into_iter().collect()));
            hub.send_to(id, ServerMessage::Subscribed { chains: acked });
        }
        ClientMessage::Unsubscribe => {
            hub.set_filter(id, None);
            hub.send_to(id, ServerMessage::Subscribed { chains: Vec::new() });
        }
        ClientMessage::Ping => {
            hub.send_to(id, ServerMessage::Pong);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn subscribe_sets_filter_and_acks() {
        let hub = Arc::new(SubscriberHub::new());
        let (id, mut rx) = hub.register();

        handle_client_message(&hub, id, r#"{"type":"subscribe","chains":[8453,1,1]}"#);
        match rx.recv().await.unwrap() {
            ServerMessage::Subscribed { chains } => assert_eq!(chains, vec![1, 8453]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_acks_empty_filter() {
        let hub = Arc::new(SubscriberHub::new());
        let (id, mut rx) = hub.register();

        handle_client_message(&hub, id, r#"{"type":"unsubscribe"}"#);
        match rx.recv().await.unwrap() {
            ServerMessage::Subscribed { chains } => assert!(chains.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let hub = Arc::new(SubscriberHub::new());
        let (id, mut rx) = hub.register();

        handle_client_message(&hub, id, r#"{"type":"ping"}"#);
        assert_eq!(rx.recv().await.unwrap(), ServerMessage::Pong);
    }

    #[tokio::test]
    async fn garbage_is_ignored() {
        let hub = Arc::new(SubscriberHub::new());
        let (id, mut rx) = hub.register();

        handle_client_message(&hub, id, "lol");
        handle_client_message(&hub, id, r#"{"type":"selfdestruct"}"#);
        assert!(rx.try_recv().is_err());
    }
}
