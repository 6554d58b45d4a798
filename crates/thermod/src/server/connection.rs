//! Connection handler for individual agent sessions.
//!
//! Each connection gets its own `ConnectionHandler` that:
//! - Performs protocol version and namespace negotiation
//! - Parses incoming messages
//! - Routes requests to the registry
//! - Sends one response per request
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use thermo_core::{NodeId, SensorKey, SensorMetadata};
use thermo_protocol::{ClientMessage, MessageType, NodeSummary, ProtocolVersion, ServerMessage};

use crate::registry::{RegistryError, RegistryHandle};

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single agent session.
pub struct ConnectionHandler {
    /// Buffered reader for incoming messages
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer for outgoing messages
    writer: BufWriter<OwnedWriteHalf>,

    /// Handle to the address-space registry
    registry: RegistryHandle,

    /// Namespace this server exposes
    namespace_uri: String,

    peer: SocketAddr,

    /// Client identifier (assigned after handshake)
    client_id: Option<String>,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        registry: RegistryHandle,
        namespace_uri: String,
        peer: SocketAddr,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            registry,
            namespace_uri,
            peer,
            client_id: None,
            connection_number,
        }
    }

    /// Runs the connection: handshake, then the request loop.
    ///
    /// Returns the client id once the connection closes, if the handshake
    /// succeeded.
    pub async fn run(mut self) -> Option<String> {
        debug!(
            connection = self.connection_number,
            peer = %self.peer,
            "New agent connected"
        );

        let handshake = match timeout(READ_TIMEOUT, self.handle_handshake()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        };
        if let Err(e) = handshake {
            warn!(
                connection = self.connection_number,
                peer = %self.peer,
                error = %e,
                "Handshake failed"
            );
            return None;
        }
        info!(client_id = ?self.client_id, peer = %self.peer, "Agent session opened");

        if let Err(e) = self.process_messages().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection closed");
        }

        info!(client_id = ?self.client_id, "Agent session closed");
        self.client_id
    }

    /// Expects a `Connect` message, validates version and namespace, and
    /// answers with `Connected` or `Rejected`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        if let Err(e) = ProtocolVersion::CURRENT.negotiate(&msg.protocol_version) {
            warn!(
                client_version = %msg.protocol_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            self.send_message(ServerMessage::rejected(&e.to_string()))
                .await?;
            return Err(ConnectionError::VersionMismatch {
                client: msg.protocol_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect {
                client_id,
                namespace_uri,
            } => {
                if namespace_uri != self.namespace_uri {
                    self.send_message(ServerMessage::rejected(&format!(
                        "Unknown namespace '{namespace_uri}', server exposes '{}'",
                        self.namespace_uri
                    )))
                    .await?;
                    return Err(ConnectionError::NamespaceMismatch(namespace_uri));
                }

                let assigned_id =
                    client_id.unwrap_or_else(|| format!("agent-{}", self.connection_number));
                self.client_id = Some(assigned_id.clone());
                self.send_message(ServerMessage::connected(assigned_id))
                    .await
            }
            other => {
                self.send_message(ServerMessage::error(
                    "Expected Connect message for handshake",
                ))
                .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    /// Reads and answers requests until the connection closes.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Agent sent EOF");
                    return Ok(());
                }
                Ok(Err(ConnectionError::ParseError(e))) => {
                    // A bad line is answered; the session stays up
                    self.send_message(ServerMessage::error_with_code(&e, "parse_error"))
                        .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            let reply = match self.handle_message(msg).await {
                Ok(Some(reply)) => reply,
                Ok(None) => return Ok(()),
                Err(e) => {
                    debug!(client_id = ?self.client_id, error = %e, "Request failed");
                    error_reply(&e)
                }
            };
            self.send_message(reply).await?;
        }
    }

    /// Handles one request. `Ok(None)` ends the session.
    async fn handle_message(
        &mut self,
        msg: ClientMessage,
    ) -> Result<Option<ServerMessage>, ConnectionError> {
        let reply = match msg.message {
            MessageType::Connect { .. } => ServerMessage::error("Already connected"),

            MessageType::GetOrCreateNode { key, metadata } => {
                let handle = self.registry.get_or_create(key, metadata).await?;
                ServerMessage::node_handle(handle.node_id, handle.created)
            }

            MessageType::WriteValue {
                node_id,
                key,
                value,
                metadata,
            } => {
                self.handle_write(node_id, key, value, metadata).await?;
                ServerMessage::write_ack(node_id)
            }

            MessageType::ReadValue { node_id } => {
                let value = self.registry.read(node_id).await?;
                ServerMessage::value(node_id, value)
            }

            MessageType::ListNodes => {
                let nodes = self
                    .registry
                    .list_entries()
                    .await?
                    .iter()
                    .map(|(id, entry)| NodeSummary::from_entry(*id, entry))
                    .collect();
                ServerMessage::node_list(nodes)
            }

            MessageType::Ping { seq } => ServerMessage::pong(seq),

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Agent requested disconnect");
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    /// Writes a value, creating the slot lazily for an unseen key.
    async fn handle_write(
        &mut self,
        node_id: NodeId,
        key: SensorKey,
        value: f64,
        metadata: SensorMetadata,
    ) -> Result<(), ConnectionError> {
        let derived = NodeId::derive(&key);
        if derived != node_id {
            return Err(ConnectionError::NodeMismatch {
                claimed: node_id,
                derived,
            });
        }

        let handle = self.registry.write_reading(key, value, metadata).await?;
        if handle.created {
            debug!(
                client_id = ?self.client_id,
                node_id = %handle.node_id,
                key = %key,
                "Slot created on first write"
            );
        }
        Ok(())
    }

    /// Reads a single newline-terminated message.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();
        let limit = (MAX_MESSAGE_SIZE + 1) as u64;

        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_str(line.trim_end())
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    /// Sends a message to the agent.
    async fn send_message(&mut self, msg: ServerMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        let writer = &mut self.writer;
        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Returns the client ID (if connected).
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Maps a failed request onto a wire error with a stable code.
fn error_reply(err: &ConnectionError) -> ServerMessage {
    let code = match err {
        ConnectionError::Registry(RegistryError::NotFound(_)) => "not_found",
        ConnectionError::Registry(RegistryError::RegistryFull { .. }) => "registry_full",
        ConnectionError::Registry(RegistryError::Invalid(_)) => "invalid",
        ConnectionError::NodeMismatch { .. } => "node_mismatch",
        _ => "internal",
    };
    ServerMessage::error_with_code(&err.to_string(), code)
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Namespace mismatch: {0}")]
    NamespaceMismatch(String),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Node id {claimed} does not match key (derived {derived})")]
    NodeMismatch { claimed: NodeId, derived: NodeId },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermo_core::{HardwareType, Location};

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }

    #[test]
    fn test_error_codes() {
        let key = SensorKey::new(Location::new(1, 101, 1), HardwareType::CPU, 2);
        let id = NodeId::derive(&key);

        let reply = error_reply(&ConnectionError::Registry(RegistryError::NotFound(id)));
        assert!(matches!(
            reply,
            ServerMessage::Error { code: Some(ref c), .. } if c == "not_found"
        ));

        let reply = error_reply(&ConnectionError::NodeMismatch {
            claimed: NodeId::new(1).unwrap(),
            derived: id,
        });
        assert!(matches!(
            reply,
            ServerMessage::Error { code: Some(ref c), .. } if c == "node_mismatch"
        ));
    }
}
