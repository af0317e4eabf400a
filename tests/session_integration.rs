//! Session integration tests against an in-process WebSocket server.
//!
//! Tests connect, bounded receive, malformed frames, and idempotent close.

mod common;

use common::MockServer;
use pp_harness::{NetError, Session, messages::Envelope};
use serde_json::json;
use std::time::Duration;

const CONNECT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_send_reaches_server() {
    let server = MockServer::start().await;
    let session = Session::open(&server.endpoint, CONNECT).await.unwrap();
    assert!(session.is_connected());
    assert_eq!(session.endpoint(), server.endpoint);

    session
        .send(&Envelope::new("takeSeat", json!({ "seat": 3 })))
        .unwrap();

    let seats = server.wait_for_type("takeSeat", 1).await;
    assert_eq!(seats[0], json!({ "messageType": "takeSeat", "data": { "seat": 3 } }));
}

#[tokio::test]
async fn test_receive_timeout_leaves_session_usable() {
    let server = MockServer::start().await;
    let session = Session::open(&server.endpoint, CONNECT).await.unwrap();
    server.wait_for_connections(1).await;

    let result = session.receive(Duration::from_millis(50)).await;
    assert!(matches!(result, Err(NetError::ReceiveTimeout(_))));
    assert!(session.is_connected());

    server.broadcast_json("potUpdate", json!({ "pot": 30 }));
    let envelope = session.receive(Duration::from_secs(2)).await.unwrap();
    assert_eq!(envelope.message_type, "potUpdate");
    assert_eq!(envelope.data["pot"], 30);
}

#[tokio::test]
async fn test_malformed_frame_does_not_end_session() {
    let server = MockServer::start().await;
    let session = Session::open(&server.endpoint, CONNECT).await.unwrap();
    server.wait_for_connections(1).await;

    server.broadcast("not json at all");
    server.broadcast_json("handWinnings", json!({ "1": 40 }));

    let first = session.receive(Duration::from_secs(2)).await;
    assert!(matches!(first, Err(NetError::MalformedMessage(_))));
    assert!(session.is_connected());

    let second = session.receive(Duration::from_secs(2)).await.unwrap();
    assert_eq!(second.message_type, "handWinnings");
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = MockServer::start().await;
    let session = Session::open(&server.endpoint, CONNECT).await.unwrap();
    server.wait_for_connections(1).await;

    session.close().await;
    session.close().await;
    assert!(!session.is_connected());

    assert!(matches!(
        session.send(&Envelope::bare("startGame")),
        Err(NetError::NotConnected)
    ));
    assert!(matches!(
        session.receive(Duration::from_millis(10)).await,
        Err(NetError::ConnectionClosed)
    ));

    common::wait_until(|| server.connections() == 0).await;
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = format!("ws://127.0.0.1:{port}");
    let error = Session::open(&endpoint, CONNECT).await.unwrap_err();
    assert!(matches!(error, NetError::ConnectionRefused { .. }));
    assert!(error.to_string().contains(&endpoint));
}
