//! Protocol message types for registry sessions.

use crate::version::ProtocolVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thermo_core::{HardwareState, Location, NodeId, RegistryEntry, SensorKey, SensorMetadata};

/// Requests a client can send to the registry server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Session handshake
    Connect {
        /// Client identifier (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        /// Namespace the client expects the server to expose
        namespace_uri: String,
    },

    /// Resolve the slot for a sensor, creating it if needed
    GetOrCreateNode {
        key: SensorKey,
        metadata: SensorMetadata,
    },

    /// Store a value in a slot.
    ///
    /// Carries the key so the server can create the slot lazily.
    WriteValue {
        node_id: NodeId,
        key: SensorKey,
        value: f64,
        metadata: SensorMetadata,
    },

    /// Read the current value of a slot
    ReadValue { node_id: NodeId },

    /// Request a listing of all slots
    ListNodes,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client closing the session gracefully
    Disconnect,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Wraps a payload with the current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>, namespace_uri: impl Into<String>) -> Self {
        Self::new(MessageType::Connect {
            client_id,
            namespace_uri: namespace_uri.into(),
        })
    }

    pub fn get_or_create_node(key: SensorKey, metadata: SensorMetadata) -> Self {
        Self::new(MessageType::GetOrCreateNode { key, metadata })
    }

    pub fn write_value(node_id: NodeId, key: SensorKey, value: f64, metadata: SensorMetadata) -> Self {
        Self::new(MessageType::WriteValue {
            node_id,
            key,
            value,
            metadata,
        })
    }

    pub fn read_value(node_id: NodeId) -> Self {
        Self::new(MessageType::ReadValue { node_id })
    }

    pub fn list_nodes() -> Self {
        Self::new(MessageType::ListNodes)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Flattened view of a registry slot for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: NodeId,
    pub display_name: String,
    pub value: f64,
    pub location: Location,
    pub hardware_name: Option<String>,
    pub sensor_name: String,
    pub state: HardwareState,
    pub created_at: DateTime<Utc>,
}

impl NodeSummary {
    pub fn from_entry(node_id: NodeId, entry: &RegistryEntry) -> Self {
        Self {
            node_id,
            display_name: entry.display_name(),
            value: entry.value,
            location: entry.metadata.location,
            hardware_name: entry.metadata.hardware_name.clone(),
            sensor_name: entry.metadata.sensor_name.clone(),
            state: entry.state(),
            created_at: entry.metadata.created_at,
        }
    }
}

/// Messages sent from server to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Handshake refused (version or namespace mismatch)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Slot resolved; `created` is true when this request materialised it
    NodeHandle { node_id: NodeId, created: bool },

    /// Value stored
    WriteAck { node_id: NodeId },

    /// Current value of a slot
    Value { node_id: NodeId, value: f64 },

    /// Full slot listing
    NodeList { nodes: Vec<NodeSummary> },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Request failed
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn node_handle(node_id: NodeId, created: bool) -> Self {
        Self::NodeHandle { node_id, created }
    }

    pub fn write_ack(node_id: NodeId) -> Self {
        Self::WriteAck { node_id }
    }

    pub fn value(node_id: NodeId, value: f64) -> Self {
        Self::Value { node_id, value }
    }

    pub fn node_list(nodes: Vec<NodeSummary>) -> Self {
        Self::NodeList { nodes }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermo_core::HardwareType;

    fn cpu_key() -> SensorKey {
        SensorKey::new(Location::new(1, 101, 1), HardwareType::CPU, 2)
    }

    #[test]
    fn test_client_message_wire_shape() {
        let msg = ClientMessage::connect(None, "urn:test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connect\""));
        assert!(json.contains("\"namespace_uri\":\"urn:test\""));
        assert!(json.contains("\"protocol_version\":{\"major\":1,\"minor\":0}"));
        assert!(!json.contains("client_id"));
    }

    #[test]
    fn test_write_value_parses_back() {
        let key = cpu_key();
        let msg = ClientMessage::write_value(
            NodeId::derive(&key),
            key,
            47.5,
            SensorMetadata::new(Some("Intel Core i5".into()), "CPU Core #3"),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();

        match parsed.message {
            MessageType::WriteValue {
                node_id,
                key: parsed_key,
                value,
                metadata,
            } => {
                assert_eq!(node_id.get(), 415_735);
                assert_eq!(parsed_key, key);
                assert_eq!(value, 47.5);
                assert_eq!(metadata.hardware_name.as_deref(), Some("Intel Core i5"));
            }
            other => panic!("Expected WriteValue, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_sensor_index_rejected_on_the_wire() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"get_or_create_node",
            "key":{"location":{"building":1,"room":101,"pc":1},"hardware_type":"CPU","sensor_index":-1},
            "metadata":{"sensor_name":"x"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_unknown_hardware_rejected_on_the_wire() {
        let json = r#"{"protocol_version":{"major":1,"minor":0},"type":"get_or_create_node",
            "key":{"location":{"building":1,"room":101,"pc":1},"hardware_type":"Toaster","sensor_index":0},
            "metadata":{"sensor_name":"x"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::node_handle(NodeId::derive(&cpu_key()), true);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"node_handle\""));
        assert!(json.contains("\"node_id\":415735"));
        assert!(json.contains("\"created\":true"));

        let err = ServerMessage::error_with_code("no such node", "not_found");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"not_found\""));
    }

    #[test]
    fn test_node_summary_from_entry() {
        let key = cpu_key();
        let mut entry = RegistryEntry::new(key, SensorMetadata::unknown("CPU Core #3"));
        entry.record(51.0);
        let summary = NodeSummary::from_entry(NodeId::derive(&key), &entry);
        assert_eq!(summary.display_name, "B1_R101_P1_CPU_2");
        assert_eq!(summary.value, 51.0);
        assert_eq!(summary.state, HardwareState::Unknown);
    }
}
