// Unix domain socket transport with a length-prefixed JSON protocol

use crate::error::{FolioError, Result};
use crate::service::ProcessState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

/// Maximum frame payload (10MB)
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

/// Requests a client sends to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Ask a question about the loaded document
    Query { query: String },
    /// Report the process state
    Status,
}

/// Reply to any request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Answer, status text or user-facing error message
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ProcessState>,
}

impl Reply {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            state: None,
        }
    }

    pub fn with_state(response: impl Into<String>, state: ProcessState) -> Self {
        Self {
            response: response.into(),
            state: Some(state),
        }
    }
}

/// Listening side of the socket
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            listener: None,
        }
    }

    /// Bind to the socket path, replacing a stale socket file
    ///
    /// Fails if another server still answers on the path.
    pub async fn bind(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            if UnixStream::connect(&self.socket_path).await.is_ok() {
                return Err(FolioError::Server(format!(
                    "Another server is already listening on {:?}",
                    self.socket_path
                )));
            }

            tracing::debug!("Removing stale socket {:?}", self.socket_path);
            std::fs::remove_file(&self.socket_path).map_err(|e| FolioError::Io {
                source: e,
                context: format!("Failed to remove existing socket: {:?}", self.socket_path),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FolioError::Io {
                source: e,
                context: format!("Failed to create socket directory: {:?}", parent),
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| FolioError::Io {
            source: e,
            context: format!("Failed to bind to socket: {:?}", self.socket_path),
        })?;

        self.listener = Some(listener);

        tracing::info!("Listening on {:?}", self.socket_path);
        Ok(())
    }

    pub async fn accept(&mut self) -> Result<UnixStream> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| FolioError::Server("Server not bound".to_string()))?;

        let (stream, _addr) = listener.accept().await.map_err(|e| FolioError::Io {
            source: e,
            context: "Failed to accept connection".to_string(),
        })?;

        Ok(stream)
    }

    /// Stop listening and remove the socket file
    pub fn shutdown(&mut self) -> Result<()> {
        self.listener = None;
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| FolioError::Io {
                source: e,
                context: format!("Failed to remove socket: {:?}", self.socket_path),
            })?;
        }
        Ok(())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Read one length-prefixed frame
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let length = reader.read_u32().await.map_err(|e| FolioError::Io {
        source: e,
        context: "Failed to read message length".to_string(),
    })?;

    if length > MAX_MESSAGE_SIZE {
        return Err(FolioError::Server(format!(
            "Message too large: {} bytes (max: {})",
            length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; length as usize];
    reader
        .read_exact(&mut buffer)
        .await
        .map_err(|e| FolioError::Io {
            source: e,
            context: "Failed to read message payload".to_string(),
        })?;

    Ok(buffer)
}

/// Write one length-prefixed frame (4-byte big-endian length)
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(FolioError::Server(format!(
            "Message too large: {} bytes (max: {})",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    writer
        .write_u32(payload.len() as u32)
        .await
        .map_err(|e| FolioError::Io {
            source: e,
            context: "Failed to write message length".to_string(),
        })?;

    writer.write_all(payload).await.map_err(|e| FolioError::Io {
        source: e,
        context: "Failed to write message payload".to_string(),
    })?;

    writer.flush().await.map_err(|e| FolioError::Io {
        source: e,
        context: "Failed to flush message".to_string(),
    })?;

    Ok(())
}

pub async fn read_json<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    serde_json::from_slice(&payload).map_err(|e| FolioError::Json {
        source: e,
        context: "Failed to deserialize message".to_string(),
    })
}

pub async fn write_json<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message).map_err(|e| FolioError::Json {
        source: e,
        context: "Failed to serialize message".to_string(),
    })?;
    write_frame(writer, &payload).await
}

/// Client for a running `folio serve`
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Connect, send one request and wait for its reply
    pub async fn send(&self, request: &Request) -> Result<Reply> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| FolioError::Io {
                source: e,
                context: format!("Failed to connect to server at {:?}", self.socket_path),
            })?;

        write_json(&mut stream, request).await?;
        read_json(&mut stream).await
    }

    pub async fn query(&self, query: impl Into<String>) -> Result<Reply> {
        self.send(&Request::Query {
            query: query.into(),
        })
        .await
    }

    pub async fn status(&self) -> Result<Reply> {
        self.send(&Request::Status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(Request::Query {
            query: "Who?".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "query", "query": "Who?"}));

        let status: Request = serde_json::from_str(r#"{"type":"status"}"#).unwrap();
        assert_eq!(status, Request::Status);
    }

    #[test]
    fn test_reply_omits_missing_state() {
        let json = serde_json::to_string(&Reply::new("Paris")).unwrap();
        assert_eq!(json, r#"{"response":"Paris"}"#);

        let json = serde_json::to_string(&Reply::with_state("ok", ProcessState::Ready)).unwrap();
        assert_eq!(json, r#"{"response":"ok","state":"ready"}"#);
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_json(&mut client, &Request::Status).await.unwrap();
        let received: Request = read_json(&mut server).await.unwrap();
        assert_eq!(received, Request::Status);
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("folio.sock");

        let mut first = IpcServer::new(path.clone());
        first.bind().await.unwrap();

        let mut second = IpcServer::new(path.clone());
        let result = second.bind().await;
        assert!(matches!(result, Err(FolioError::Server(_))));
        assert!(path.exists());

        // The first server still accepts
        let connect = UnixStream::connect(&path);
        let (accepted, connected) = tokio::join!(first.accept(), connect);
        accepted.unwrap();
        connected.unwrap();
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("folio.sock");

        // A listener that went away leaves its socket file behind
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let mut server = IpcServer::new(path.clone());
        server.bind().await.unwrap();
        server.shutdown().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        client.write_u32(MAX_MESSAGE_SIZE + 1).await.unwrap();
        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(FolioError::Server(_))));
    }
}
