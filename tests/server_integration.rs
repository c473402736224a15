mod common;

use common::{harness, PARIS_DOCUMENT};
use folio::config::ServerConfig;
use folio::extraction::Document;
use folio::server::{write_frame, IpcClient, Reply, Server};
use folio::service::ProcessState;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::time::sleep;

async fn raw_request(socket: &std::path::Path, body: &[u8]) -> Reply {
    let mut stream = UnixStream::connect(socket).await.unwrap();
    write_frame(&mut stream, body).await.unwrap();
    folio::server::read_json(&mut stream).await.unwrap()
}

#[tokio::test]
async fn test_socket_roundtrip() {
    let temp = TempDir::new().unwrap();
    let socket_path = temp.path().join("run").join("folio.sock");

    let h = harness();
    let server = Server::new(
        h.service.clone(),
        &ServerConfig {
            socket_path: socket_path.clone(),
            max_connections: 4,
        },
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_handle = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    // Wait for the socket to appear
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let client = IpcClient::new(socket_path.clone());

    // Not loaded yet
    let status = client.status().await.unwrap();
    assert_eq!(status.state, Some(ProcessState::Uninitialized));

    let reply = client.query("What is the capital of France?").await.unwrap();
    assert_eq!(reply.response, "Document data not loaded. Try again later.");

    h.service
        .load_document(Document::new("france", PARIS_DOCUMENT))
        .await
        .unwrap();

    let status = client.status().await.unwrap();
    assert_eq!(status.state, Some(ProcessState::Ready));
    assert!(status.response.contains("france"));

    let reply = client.query("What is the capital of France?").await.unwrap();
    assert!(reply.response.contains("Paris"));
    assert_eq!(reply.state, Some(ProcessState::Ready));

    // Untagged mapping is treated as a query
    let reply = raw_request(&socket_path, br#"{"query": "What is the capital of France?"}"#).await;
    assert!(reply.response.contains("Paris"));

    let reply = raw_request(&socket_path, br#"{"type": "query"}"#).await;
    assert!(reply.response.starts_with("Invalid request"));

    let reply = raw_request(&socket_path, b"not json").await;
    assert!(reply.response.starts_with("Invalid request"));

    let reply = raw_request(&socket_path, br#"{"type": "reload"}"#).await;
    assert!(reply.response.contains("unknown request type"));

    stop_tx.send(()).unwrap();
    server_handle.await.unwrap().unwrap();
    assert!(!socket_path.exists(), "socket should be removed on shutdown");
}

#[tokio::test]
async fn test_client_without_server() {
    let temp = TempDir::new().unwrap();
    let client = IpcClient::new(temp.path().join("nobody.sock"));
    assert!(client.status().await.is_err());
}

#[tokio::test]
async fn test_shutdown_with_all_connections_busy() {
    let temp = TempDir::new().unwrap();
    let socket_path = temp.path().join("folio.sock");

    let h = harness();
    let server = Server::new(
        h.service.clone(),
        &ServerConfig {
            socket_path: socket_path.clone(),
            max_connections: 1,
        },
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_handle = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    // Neither client sends a frame, so the only permit stays taken
    let _busy = UnixStream::connect(&socket_path).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let _waiting = UnixStream::connect(&socket_path).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    stop_tx.send(()).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(2), server_handle).await;
    stopped
        .expect("server should stop while every permit is held")
        .unwrap()
        .unwrap();
    assert!(!socket_path.exists());
}
