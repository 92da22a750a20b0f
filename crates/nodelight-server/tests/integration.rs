//! End-to-end tests using real WebSocket clients against the spoofer.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use nodelight_core::Device;
use nodelight_device::Spoofer;
use nodelight_server::{Hub, HubHandle, NodelightServer, ShutdownCoordinator};
use nodelight_settings::ServerSettings;

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    url: String,
    hub: HubHandle,
    server: NodelightServer,
}

/// Boot a server with a spoofer on an ephemeral port.
async fn boot_server() -> TestServer {
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let (hub, handle) = Hub::new(64);
    let _hub_task = tokio::spawn(hub.run(shutdown.token()));

    let spoofer: Arc<dyn Device> = Arc::new(Spoofer::new(Arc::new(handle.clone())));
    let settings = ServerSettings {
        host: "127.0.0.1".into(),
        port: 0,
        static_dir: "/nonexistent".into(),
        ..ServerSettings::default()
    };
    let server = NodelightServer::new(settings, handle.clone(), Some(spoofer), shutdown);
    let (addr, _serve_task) = server.listen().await.unwrap();

    TestServer {
        url: format!("ws://{addr}/ws"),
        hub: handle,
        server,
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

/// Connect `n` clients and wait until the hub has registered all of them.
async fn connect_all(ts: &TestServer, n: usize) -> Vec<WsStream> {
    let mut clients = Vec::with_capacity(n);
    for _ in 0..n {
        clients.push(connect(&ts.url).await);
    }
    timeout(TIMEOUT, async {
        while ts.hub.client_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    clients
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next data frame as JSON, skipping heartbeats.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Assert no data frame arrives within [`QUIET`].
async fn assert_quiet(ws: &mut WsStream) {
    let deadline = tokio::time::Instant::now() + QUIET;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn light_control_on_reaches_every_viewer() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 2).await;

    send_json(
        &mut clients[0],
        &json!({"type": "light_control", "nodeId": "n1", "command": "on", "color": "#ff0000"}),
    )
    .await;

    for ws in &mut clients {
        let frame = next_json(ws).await;
        assert_eq!(
            frame,
            json!({"type": "arduino_state", "nodeId": "n1", "state": "on", "color": "#ff0000"})
        );
    }
}

#[tokio::test]
async fn unsupported_spoofer_command_is_silent() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 2).await;

    send_json(
        &mut clients[0],
        &json!({"type": "light_control", "nodeId": "n1", "command": "blink"}),
    )
    .await;

    for ws in &mut clients {
        assert_quiet(ws).await;
    }
}

#[tokio::test]
async fn request_states_replies_only_to_requester() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 2).await;

    send_json(
        &mut clients[0],
        &json!({"type": "light_control", "nodeId": "n7", "command": "off"}),
    )
    .await;
    for ws in &mut clients {
        let _ = next_json(ws).await;
    }

    send_json(&mut clients[0], &json!({"type": "request_states"})).await;
    let reply = next_json(&mut clients[0]).await;
    assert_eq!(reply["type"], "all_states");
    assert_eq!(
        reply["states"],
        json!([{"type": "arduino_state", "nodeId": "n7", "state": "off"}])
    );

    assert_quiet(&mut clients[1]).await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_and_relay_still_works() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 2).await;

    clients[0]
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    send_json(&mut clients[0], &json!({"nodeId": "n1", "state": "on"})).await;
    assert_quiet(&mut clients[1]).await;

    let chat = json!({"type": "chat", "text": "hello"});
    send_json(&mut clients[0], &chat).await;
    assert_eq!(next_json(&mut clients[1]).await, chat);
    assert_eq!(next_json(&mut clients[0]).await, chat);
}

#[tokio::test]
async fn binary_frames_are_routed_like_text() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 1).await;

    let raw = br#"{"type":"light_control","nodeId":"b1","command":"on"}"#;
    clients[0]
        .send(Message::Binary(raw.to_vec().into()))
        .await
        .unwrap();

    let frame = next_json(&mut clients[0]).await;
    assert_eq!(frame["nodeId"], "b1");
    assert_eq!(frame["state"], "on");
}

#[tokio::test]
async fn disconnect_unregisters_client() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 2).await;

    let mut gone = clients.remove(0);
    gone.close(None).await.unwrap();
    drop(gone);

    timeout(TIMEOUT, async {
        while ts.hub.client_count() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn shutdown_closes_viewer_connections() {
    let ts = boot_server().await;
    let mut clients = connect_all(&ts, 1).await;

    ts.server.shutdown().shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match clients[0].next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
