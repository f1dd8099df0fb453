//! Integration tests for the socket client
//!
//! Each test runs a local WebSocket server and hands every accepted
//! connection to the test body, which plays the chat server.

use std::sync::Arc;
use std::time::Duration;

use bookback_chat::websocket::ChatTransport;
use bookback_chat::{ChatConfig, ChatError, SocketClient};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

type ServerConn = WebSocketStream<TcpStream>;

/// Start a test server on a random available port
async fn start_test_server() -> (
    String,
    mpsc::UnboundedReceiver<ServerConn>,
    tokio::task::JoinHandle<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = accept_async(stream).await {
                let _ = tx.send(ws);
            }
        }
    });

    (format!("ws://127.0.0.1:{}", port), rx, handle)
}

fn test_config(url: &str) -> ChatConfig {
    ChatConfig {
        socket_url: url.to_string(),
        reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(50),
        ..ChatConfig::default()
    }
}

async fn accept(rx: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for client connection")
        .expect("Server stopped")
}

/// Read the next text frame as JSON
async fn next_event(conn: &mut ServerConn) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), conn.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream closed")
            .expect("Read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_connected(client: &SocketClient) {
    for _ in 0..500 {
        if client.is_connected() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Client never connected");
}

#[tokio::test]
async fn test_registers_stored_identity_on_connect() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    client.register("U1").unwrap();
    client.connect();

    let mut conn = accept(&mut conns).await;
    let event = next_event(&mut conn).await;
    assert_eq!(event["event"], "register");
    assert_eq!(event["data"]["userId"], "U1");

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn test_register_is_idempotent_on_same_connection() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    client.connect();
    let mut conn = accept(&mut conns).await;
    wait_connected(&client).await;

    client.register("U1").unwrap();
    client.register("U1").unwrap();
    client.send_message("U1", "U2", "hello", None).unwrap();

    let first = next_event(&mut conn).await;
    assert_eq!(first["event"], "register");
    let second = next_event(&mut conn).await;
    assert_eq!(second["event"], "sendMessage");
    assert_eq!(second["data"]["content"], "hello");
    assert_eq!(second["data"]["messageType"], "text");

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn test_connect_twice_opens_one_connection() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    client.connect();
    client.connect();
    assert!(client.is_initialized());

    let _conn = accept(&mut conns).await;
    let second = timeout(Duration::from_millis(300), conns.recv()).await;
    assert!(second.is_err(), "connect() should not open a second socket");

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn test_reregisters_after_server_drop() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    client.register("U1").unwrap();
    client.connect();

    let mut first = accept(&mut conns).await;
    assert_eq!(next_event(&mut first).await["event"], "register");
    first.close(None).await.unwrap();
    drop(first);

    // The transport reconnects by itself and announces the same user again
    let mut second = accept(&mut conns).await;
    let event = next_event(&mut second).await;
    assert_eq!(event["event"], "register");
    assert_eq!(event["data"]["userId"], "U1");

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn test_inbound_events_reach_handlers() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.handlers().on_new_chat(move |event| {
        let _ = tx.send(event);
    });

    client.connect();
    let mut conn = accept(&mut conns).await;

    // Malformed frames are dropped before reaching handlers
    conn.send(Message::Text("{\"event\":\"newChat\",\"data\":{}}".to_string()))
        .await
        .unwrap();
    let frame = json!({
        "event": "newChat",
        "data": { "chat": {
            "userId1": { "_id": "U1" },
            "userId2": { "_id": "U2", "Name": "Bob" },
            "last_message": "hi",
            "updated_at": "2024-03-01T10:00:00Z"
        }}
    });
    conn.send(Message::Text(frame.to_string())).await.unwrap();

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for newChat")
        .unwrap();
    assert_eq!(event.chat.participant_b.id, "U2");
    assert_eq!(event.chat.last_message.as_deref(), Some("hi"));
    assert!(rx.try_recv().is_err());

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn test_gives_up_after_bounded_attempts() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ChatConfig {
        reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(20),
        ..test_config(&format!("ws://127.0.0.1:{}", port))
    };
    let client = Arc::new(SocketClient::new(&config));

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.handlers().on_error(move |e| {
        let _ = tx.send(e.message);
    });

    client.connect();
    let message = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for give-up error")
        .unwrap();
    assert!(message.contains("2 attempts"));
    assert!(!client.is_initialized());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_disconnect_closes_and_stops_reconnecting() {
    let (url, mut conns, server) = start_test_server().await;
    let client = SocketClient::new(&test_config(&url));

    client.connect();
    let mut conn = accept(&mut conns).await;
    wait_connected(&client).await;

    client.disconnect();
    assert!(!client.is_initialized());

    let msg = timeout(Duration::from_secs(5), conn.next()).await.unwrap();
    assert!(matches!(msg, Some(Ok(Message::Close(_))) | None | Some(Err(_))));

    let again = timeout(Duration::from_millis(300), conns.recv()).await;
    assert!(again.is_err(), "client reconnected after disconnect()");

    server.abort();
}

#[tokio::test]
async fn test_emit_without_connection_fails() {
    let client = SocketClient::new(&ChatConfig::default());
    let err = client.emit_typing("U1", "U2", true).unwrap_err();
    assert!(matches!(err, ChatError::NotConnected));
}
