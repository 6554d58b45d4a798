//! Transport abstraction between the agent and the registry.
//!
//! The session manager only talks to the `Transport` and
//! `TransportSession` traits. `TcpTransport` is the built-in
//! implementation: newline-delimited JSON over TCP, speaking the
//! `thermo-protocol` handshake.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Every network operation is bounded by the configured timeout

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thermo_core::{NodeId, SensorKey, SensorMetadata};
use thermo_protocol::{ClientMessage, ServerMessage};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::TransportError;

/// Port used when the server URL does not name one.
pub const DEFAULT_PORT: u16 = 4840;

/// Maximum size of a single server response.
pub const MAX_RESPONSE_SIZE: u64 = 16 * 1024 * 1024;

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub namespace_uri: String,
    pub client_id: Option<String>,
    /// Bound on connect and on each request
    pub timeout: Duration,
}

/// Opens sessions with a registry server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// An open session with a registry server.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Resolves the server handle for `key`, creating the slot if needed.
    async fn get_or_create_node(
        &self,
        key: SensorKey,
        metadata: &SensorMetadata,
    ) -> Result<NodeId, TransportError>;

    async fn write(
        &self,
        handle: NodeId,
        key: SensorKey,
        value: f64,
        metadata: &SensorMetadata,
    ) -> Result<(), TransportError>;

    async fn read(&self, handle: NodeId) -> Result<f64, TransportError>;

    /// Ends the session. Further calls fail with `SessionClosed`.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Extracts `host:port` from a server URL such as
/// `opc.tcp://localhost:4840/freeopcua/server/`.
pub fn parse_endpoint(url: &str) -> Result<String, TransportError> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(TransportError::InvalidUrl(url.to_string()));
    }

    let has_port = match authority.rfind(']') {
        Some(end) => authority.get(end..).is_some_and(|tail| tail.contains(':')),
        None => authority.contains(':'),
    };
    if has_port {
        Ok(authority.to_string())
    } else {
        Ok(format!("{authority}:{DEFAULT_PORT}"))
    }
}

// ============================================================================
// TCP Transport
// ============================================================================

/// Newline-JSON transport over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let endpoint = parse_endpoint(url)?;
        let connect_err = |reason: String| TransportError::Connect {
            endpoint: endpoint.clone(),
            reason,
        };

        let stream = timeout(options.timeout, TcpStream::connect(endpoint.as_str()))
            .await
            .map_err(|_| TransportError::Timeout {
                after: options.timeout,
            })?
            .map_err(|e| connect_err(e.to_string()))?;

        let (reader, writer) = stream.into_split();
        let session = TcpSession {
            conn: Mutex::new(Connection {
                reader: BufReader::new(reader),
                writer,
            }),
            closed: AtomicBool::new(false),
            timeout: options.timeout,
        };

        let hello = ClientMessage::connect(options.client_id.clone(), options.namespace_uri.as_str());
        match session.request(&hello).await? {
            ServerMessage::Connected {
                client_id,
                protocol_version,
            } => {
                info!(
                    endpoint = %endpoint,
                    client_id = %client_id,
                    server_version = %protocol_version,
                    "Session established"
                );
                Ok(Box::new(session))
            }
            ServerMessage::Rejected { reason, .. } => Err(TransportError::Rejected(reason)),
            ServerMessage::Error { message, .. } => Err(TransportError::Rejected(message)),
            other => Err(TransportError::Protocol(format!(
                "Expected Connected, got {other:?}"
            ))),
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Session over one TCP connection. Requests are serialized.
pub struct TcpSession {
    conn: Mutex<Connection>,
    closed: AtomicBool,
    timeout: Duration,
}

impl TcpSession {
    /// Sends one request and waits for its response.
    ///
    /// Any IO failure or timeout poisons the session: the stream may hold
    /// a late response, so it is never reused.
    async fn request(&self, msg: &ClientMessage) -> Result<ServerMessage, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::SessionClosed);
        }

        let mut conn = self.conn.lock().await;
        let result = timeout(self.timeout, Self::exchange(&mut conn, msg)).await;
        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.closed.store(true, Ordering::Release);
                Err(e)
            }
            Err(_) => {
                self.closed.store(true, Ordering::Release);
                Err(TransportError::Timeout {
                    after: self.timeout,
                })
            }
        }
    }

    async fn exchange(
        conn: &mut Connection,
        msg: &ClientMessage,
    ) -> Result<ServerMessage, TransportError> {
        let mut json = serde_json::to_string(msg)?;
        json.push('\n');
        conn.writer.write_all(json.as_bytes()).await?;
        conn.writer.flush().await?;

        let mut line = String::new();
        let bytes = (&mut conn.reader)
            .take(MAX_RESPONSE_SIZE)
            .read_line(&mut line)
            .await?;
        if bytes == 0 {
            return Err(TransportError::SessionClosed);
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// Maps a server-side `Error` reply, or anything unexpected.
fn unexpected(response: ServerMessage, expected: &str) -> TransportError {
    match response {
        ServerMessage::Error { message, code } => TransportError::Server { message, code },
        other => TransportError::Protocol(format!("Expected {expected}, got {other:?}")),
    }
}

#[async_trait]
impl TransportSession for TcpSession {
    async fn get_or_create_node(
        &self,
        key: SensorKey,
        metadata: &SensorMetadata,
    ) -> Result<NodeId, TransportError> {
        match self
            .request(&ClientMessage::get_or_create_node(key, metadata.clone()))
            .await?
        {
            ServerMessage::NodeHandle { node_id, created } => {
                debug!(node_id = %node_id, created, key = %key, "Resolved node");
                Ok(node_id)
            }
            other => Err(unexpected(other, "NodeHandle")),
        }
    }

    async fn write(
        &self,
        handle: NodeId,
        key: SensorKey,
        value: f64,
        metadata: &SensorMetadata,
    ) -> Result<(), TransportError> {
        match self
            .request(&ClientMessage::write_value(handle, key, value, metadata.clone()))
            .await?
        {
            ServerMessage::WriteAck { .. } => Ok(()),
            other => Err(unexpected(other, "WriteAck")),
        }
    }

    async fn read(&self, handle: NodeId) -> Result<f64, TransportError> {
        match self.request(&ClientMessage::read_value(handle)).await? {
            ServerMessage::Value { value, .. } => Ok(value),
            other => Err(unexpected(other, "Value")),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let mut json = serde_json::to_string(&ClientMessage::disconnect())?;
        json.push('\n');
        let goodbye = async {
            conn.writer.write_all(json.as_bytes()).await?;
            conn.writer.shutdown().await
        };
        match timeout(self.timeout, goodbye).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Timeout {
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("opc.tcp://localhost:4840/freeopcua/server/").unwrap(),
            "localhost:4840"
        );
        assert_eq!(parse_endpoint("tcp://10.0.0.5").unwrap(), "10.0.0.5:4840");
        assert_eq!(parse_endpoint("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert_eq!(parse_endpoint("opc.tcp://[::1]/x").unwrap(), "[::1]:4840");
        assert_eq!(parse_endpoint("opc.tcp://[::1]:5000").unwrap(), "[::1]:5000");
    }

    #[test]
    fn test_parse_endpoint_rejects_empty_host() {
        assert!(matches!(
            parse_endpoint("opc.tcp:///path"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(parse_endpoint("").is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let options = ConnectOptions {
            namespace_uri: thermo_protocol::DEFAULT_NAMESPACE_URI.to_string(),
            client_id: None,
            timeout: Duration::from_secs(2),
        };
        let result = TcpTransport::new()
            .connect(&format!("opc.tcp://{addr}/"), &options)
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
