//! WebSocket handler for the real-time event feed
//!
//! Each connection subscribes to the hub and forwards frames from its own
//! bounded queue to the socket. Socket I/O happens here only; the hub never
//! touches the network. Keepalive pings go out every 30 seconds so idle
//! dashboards survive proxies with short idle timeouts.

use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::api::state::ApiState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let mut conn = state.hub.subscribe().await;
    let conn_id = conn.id;
    info!("WebSocket observer {conn_id} connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                frame = conn.rx.recv() => {
                    let Some(frame) = frame else {
                        // Evicted by the hub (queue stalled); close out.
                        debug!("observer {conn_id} evicted by hub");
                        break;
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        debug!("WebSocket send failed, observer {conn_id} disconnected");
                        break;
                    }
                }

                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        debug!("WebSocket ping failed, observer {conn_id} disconnected");
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                // Pongs and client chatter are ignored; the feed is one-way.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.hub.unsubscribe(conn_id).await;
    info!("WebSocket observer {conn_id} disconnected");
}
