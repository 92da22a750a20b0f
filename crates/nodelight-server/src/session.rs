//! One viewer's WebSocket session, from upgrade to disconnect.
//!
//! The socket is split into a reader task feeding the [`MessageRouter`] and
//! a writer task draining the client's queue. Whichever finishes first ends
//! the session, after which the client is unregistered from the hub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, instrument};

use crate::client::{Client, ClientQueue};
use crate::router::MessageRouter;
use crate::server::AppState;

/// Run a session for a freshly upgraded socket.
#[instrument(skip_all)]
pub async fn run_session(socket: WebSocket, state: AppState) {
    let (client, queue) = Client::new(state.client_queue_capacity);
    let client_id = client.id().clone();
    info!(%client_id, "client connected");

    state.hub.register(client.clone()).await;

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, queue, state.ping_interval));
    let mut reader = tokio::spawn(read_loop(stream, client.clone(), Arc::clone(&state.router)));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {}
    }

    client.close();
    state.hub.unregister(client_id.clone()).await;
    info!(%client_id, "client disconnected");
}

async fn read_loop(mut stream: SplitStream<WebSocket>, client: Client, router: Arc<MessageRouter>) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(client_id = %client.id(), error = %e, "websocket read failed");
                break;
            }
        };
        let frame = match message {
            Message::Text(text) => Bytes::from(text),
            Message::Binary(data) => {
                if std::str::from_utf8(&data).is_err() {
                    debug!(client_id = %client.id(), len = data.len(), "ignoring non-UTF-8 binary frame");
                    continue;
                }
                data
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let route = router.route(&client, frame);
        debug!(client_id = %client.id(), ?route, "frame routed");
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: ClientQueue,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    // The first tick fires immediately.
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            frame = queue.next() => {
                let Some(frame) = frame else { break };
                if sink.send(to_message(frame)).await.is_err() {
                    return;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }

    // Queue closed by the hub or by session teardown.
    let _ = sink.send(Message::Close(None)).await;
}

/// Frames go out as text; anything that is not UTF-8 is sent as binary.
fn to_message(frame: Bytes) -> Message {
    match Utf8Bytes::try_from(frame.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(frame),
    }
}
