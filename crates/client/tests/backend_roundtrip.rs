//! End-to-end tests against an in-process axum backend speaking the chat
//! protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ace_client::{ClientConfig, ConnectionState, ReconnectPolicy, SessionHandle, SessionState};
use ace_protocol::Role;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Backend {
    history: Value,
    /// Close each of the first N connections right after serving history.
    drop_first: usize,
    connections: AtomicUsize,
    seen: mpsc::UnboundedSender<Value>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(backend): State<Arc<Backend>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, backend))
}

async fn serve_socket(mut socket: WebSocket, backend: Arc<Backend>) {
    let conn = backend.connections.fetch_add(1, Ordering::SeqCst);

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(text.as_str()).expect("client sent invalid JSON");
        let _ = backend.seen.send(frame.clone());

        match frame["type"].as_str() {
            Some("history.request") => {
                // Noise first: the client must drop it and keep going
                let _ = socket.send(Message::Text("{not json".into())).await;
                let reply = json!({"type": "history.response", "payload": {"messages": backend.history}});
                let _ = socket.send(Message::Text(reply.to_string().into())).await;
                if conn < backend.drop_first {
                    return;
                }
            }
            Some("user.input.text") => {
                let text = frame["payload"]["text"].as_str().unwrap_or_default();
                for (chunk, partial) in [("Echo", true), (": ", true), (text, true)] {
                    let reply = json!({
                        "type": "assistant.response.text",
                        "payload": {"text": chunk, "isPartial": partial}
                    });
                    let _ = socket.send(Message::Text(reply.to_string().into())).await;
                }
                let done = json!({
                    "type": "assistant.response.text",
                    "payload": {"text": format!("Echo: {text}"), "isPartial": false}
                });
                let _ = socket.send(Message::Text(done.to_string().into())).await;
            }
            Some("connection.ping") => {
                let _ = socket
                    .send(Message::Text(json!({"type": "connection.pong"}).to_string().into()))
                    .await;
            }
            _ => {}
        }
    }
}

async fn start_backend(
    drop_first: usize,
) -> (SocketAddr, Arc<Backend>, mpsc::UnboundedReceiver<Value>) {
    let (seen, seen_rx) = mpsc::unbounded_channel();
    let backend = Arc::new(Backend {
        history: json!([
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "hi there"}
        ]),
        drop_first,
        connections: AtomicUsize::new(0),
        seen,
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("backend crashed");
    });

    (addr, backend, seen_rx)
}

fn client_for(addr: SocketAddr) -> SessionHandle {
    let config = ClientConfig {
        server_url: format!("http://{addr}"),
        reconnect: ReconnectPolicy {
            base_delay_ms: 20,
            max_delay_ms: 100,
        },
        ..ClientConfig::default()
    };
    ace_client::start(&config).expect("start client")
}

async fn wait_for<F>(handle: &SessionHandle, pred: F) -> Arc<SessionState>
where
    F: FnMut(&SessionState) -> bool,
{
    timeout(Duration::from_secs(5), handle.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
}

async fn next_frame(seen: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("timed out waiting for client frame")
        .expect("backend gone")
}

#[tokio::test]
async fn history_then_send_round_trip() {
    let (addr, _, mut seen) = start_backend(0).await;
    let client = client_for(addr);

    client.connect().await;

    let snap = wait_for(&client, |s| s.history_loaded).await;
    assert_eq!(snap.connection_state, ConnectionState::Connected);
    let history: Vec<_> = snap
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        history,
        vec![(Role::User, "hello"), (Role::Assistant, "hi there")]
    );
    assert_eq!(next_frame(&mut seen).await, json!({"type": "history.request"}));

    client.send_message("hi").await;

    assert_eq!(
        next_frame(&mut seen).await,
        json!({"type": "user.input.text", "payload": {"text": "hi"}})
    );
    let snap = wait_for(&client, |s| {
        s.messages.len() == 4 && !s.is_streaming && s.messages[3].content == "Echo: hi"
    })
    .await;
    assert_eq!(snap.messages[2].role, Role::User);
    assert_eq!(snap.messages[2].content, "hi");
    assert_eq!(snap.messages[3].role, Role::Assistant);

    client.disconnect().await;
    assert_eq!(
        client.snapshot().connection_state,
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn ping_is_answered_without_state_change() {
    let (addr, _, mut seen) = start_backend(0).await;
    let client = client_for(addr);

    client.connect().await;
    let before = wait_for(&client, |s| s.history_loaded).await;
    assert_eq!(next_frame(&mut seen).await["type"], "history.request");

    client.ping().await;
    assert_eq!(next_frame(&mut seen).await, json!({"type": "connection.ping"}));

    // The pong is applied as a no-op revision
    let after = wait_for(&client, |s| s.revision > before.revision).await;
    assert_eq!(after.messages, before.messages);
    assert_eq!(after.history_loaded, before.history_loaded);

    client.disconnect().await;
}

#[tokio::test]
async fn reconnect_refetches_history() {
    let (addr, _, mut seen) = start_backend(1).await;
    let client = client_for(addr);

    client.connect().await;

    // First connection serves history then drops; the client comes back
    // and asks again.
    assert_eq!(next_frame(&mut seen).await["type"], "history.request");
    assert_eq!(next_frame(&mut seen).await["type"], "history.request");

    let snap = wait_for(&client, |s| {
        s.history_loaded && s.connection_state == ConnectionState::Connected
    })
    .await;
    assert_eq!(snap.messages.len(), 2);

    client.disconnect().await;
}

#[tokio::test]
async fn repeated_connect_and_noise_keep_one_socket() {
    let (addr, backend, mut seen) = start_backend(0).await;
    let client = client_for(addr);

    for _ in 0..3 {
        client.connect().await;
    }

    // History arrives right after a malformed frame
    let snap = wait_for(&client, |s| s.history_loaded).await;
    assert_eq!(snap.messages.len(), 2);
    assert_eq!(next_frame(&mut seen).await["type"], "history.request");

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(backend.connections.load(Ordering::SeqCst), 1);
    let snap = client.snapshot();
    assert_eq!(snap.connection_state, ConnectionState::Connected);
    assert!(snap.history_loaded);
    assert!(seen.try_recv().is_err(), "no second history request");

    client.disconnect().await;
}
