// src/protocol/serialization.rs
//! Protocol message serialization and deserialization.
//!
//! This module converts protocol messages to and from WebSocket frames.
//! Messages travel as JSON text frames; binary frames carrying the same JSON
//! are accepted on input.

use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::trace;

use crate::protocol::types::{AgentMessage, ServerMessage};
use crate::types::Result;

/// Serde adapter that carries `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::decode(encoded.as_bytes()).map_err(de::Error::custom)
    }
}

/// What the receive loop got from one WebSocket frame
#[derive(Debug)]
pub enum InboundFrame {
    Message(ServerMessage),
    Ping(Vec<u8>),
    /// Pong or an empty frame; nothing to do
    Ignored,
    Close(Option<String>),
}

/// Serialize an agent message to a WebSocket text frame
pub fn agent_message_to_ws(message: &AgentMessage) -> Result<WsMessage> {
    let json = serde_json::to_string(message)?;
    trace!("Serialized {} message, size: {} bytes", message.kind(), json.len());
    Ok(WsMessage::Text(json))
}

/// Parse a WebSocket frame received from the server
pub fn ws_message_to_server_message(frame: WsMessage) -> Result<InboundFrame> {
    match frame {
        WsMessage::Text(text) => {
            let message: ServerMessage = serde_json::from_str(&text)?;
            Ok(InboundFrame::Message(message))
        }
        WsMessage::Binary(bytes) => {
            let message: ServerMessage = serde_json::from_slice(&bytes)?;
            Ok(InboundFrame::Message(message))
        }
        WsMessage::Ping(data) => Ok(InboundFrame::Ping(data)),
        WsMessage::Pong(_) | WsMessage::Frame(_) => Ok(InboundFrame::Ignored),
        WsMessage::Close(frame) => Ok(InboundFrame::Close(frame.map(|f| f.reason.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::FileInfo;

    #[test]
    fn test_register_wire_format() {
        let msg = AgentMessage::Register {
            agent_id: "agent-01".to_string(),
            hostname: "web-1".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "1.0.0".to_string(),
            ips: vec!["10.0.0.5".to_string()],
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["agent_id"], "agent-01");
        assert_eq!(json["ips"][0], "10.0.0.5");
    }

    #[test]
    fn test_term_output_data_is_base64() {
        let msg = AgentMessage::TermOutput {
            session_id: "s1".to_string(),
            data: b"hi\r\n".to_vec(),
        };

        match agent_message_to_ws(&msg).unwrap() {
            WsMessage::Text(text) => {
                assert!(text.contains("\"type\":\"term_output\""));
                assert!(text.contains(&format!("\"data\":\"{}\"", base64::encode(b"hi\r\n"))));
            }
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_file_list_omits_empty_error() {
        let msg = AgentMessage::FileList {
            request_id: "r1".to_string(),
            files: vec![FileInfo {
                name: "etc".to_string(),
                size: 4096,
                mode: "drwxr-xr-x".to_string(),
                mod_time: 1_700_000_000,
                is_dir: true,
            }],
            error: None,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["files"][0]["is_dir"], true);
    }

    #[test]
    fn test_server_messages_deserialize() {
        let frame = WsMessage::Text(
            r#"{"type":"register_ack","success":true,"message":"ok","heartbeat_interval_seconds":10}"#
                .to_string(),
        );
        match ws_message_to_server_message(frame).unwrap() {
            InboundFrame::Message(ServerMessage::RegisterAck {
                success,
                heartbeat_interval_seconds,
                ..
            }) => {
                assert!(success);
                assert_eq!(heartbeat_interval_seconds, Some(10));
            }
            other => panic!("Wrong message: {:?}", other),
        }

        let input = format!(
            r#"{{"type":"term_input","session_id":"s1","data":"{}"}}"#,
            base64::encode(b"ls\n")
        );
        match ws_message_to_server_message(WsMessage::Text(input)).unwrap() {
            InboundFrame::Message(ServerMessage::TermInput { session_id, data }) => {
                assert_eq!(session_id, "s1");
                assert_eq!(data, b"ls\n");
            }
            other => panic!("Wrong message: {:?}", other),
        }

        let cmd = r#"{"type":"cmd_request","request_id":"r9","command":"uptime"}"#;
        match ws_message_to_server_message(WsMessage::Binary(cmd.as_bytes().to_vec())).unwrap() {
            InboundFrame::Message(ServerMessage::CmdRequest { timeout_seconds, .. }) => {
                assert_eq!(timeout_seconds, 0);
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat_ack_and_unknown_type() {
        let ack = WsMessage::Text(r#"{"type":"heartbeat_ack"}"#.to_string());
        assert!(matches!(
            ws_message_to_server_message(ack).unwrap(),
            InboundFrame::Message(ServerMessage::HeartbeatAck {})
        ));

        let unknown = WsMessage::Text(r#"{"type":"agent_upgrade","url":"x"}"#.to_string());
        assert!(matches!(
            ws_message_to_server_message(unknown).unwrap(),
            InboundFrame::Message(ServerMessage::Unknown)
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let frame = WsMessage::Text("{not json".to_string());
        assert!(ws_message_to_server_message(frame).is_err());

        let bad_base64 = WsMessage::Text(
            r#"{"type":"term_input","session_id":"s1","data":"***"}"#.to_string(),
        );
        assert!(ws_message_to_server_message(bad_base64).is_err());
    }

    #[test]
    fn test_control_frames() {
        assert!(matches!(
            ws_message_to_server_message(WsMessage::Ping(vec![1, 2])).unwrap(),
            InboundFrame::Ping(data) if data == vec![1, 2]
        ));
        assert!(matches!(
            ws_message_to_server_message(WsMessage::Close(None)).unwrap(),
            InboundFrame::Close(None)
        ));
    }
}
