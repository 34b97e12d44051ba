//! WebSocket framing between the browser terminal and the relay
//!
//! Binary frames always carry terminal bytes. Text frames carry a JSON
//! envelope `{"type": ..., "data": ...}`:
//!
//! | type     | direction | data                          |
//! |----------|-----------|-------------------------------|
//! | `resize` | in        | `{"cols": N, "rows": N}`      |
//! | `ping`   | in        | anything                      |
//! | `pong`   | in / out  | unix timestamp on the way out |
//! | `input`  | in        | string of terminal input      |
//! | `error`  | out       | diagnostic message            |
//!
//! A text frame that is not one of the inbound envelopes is forwarded as
//! input under [`FramingPolicy::Legacy`] and dropped under
//! [`FramingPolicy::Strict`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FramingPolicy;

/// Transport-neutral WebSocket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

#[derive(Debug, Deserialize, Serialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Control messages handled by the relay itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Raw values; validation happens when the resize is applied
    Resize { cols: i64, rows: i64 },
    Ping,
    Pong,
}

/// What one inbound frame means to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Input(Bytes),
    Control(ControlMessage),
    /// WebSocket-level ping or pong; only counts as activity
    Heartbeat,
    Close,
    /// Text that is neither an envelope nor accepted as input
    Dropped(String),
}

/// Classify one inbound frame.
#[must_use]
pub fn decode_client_frame(frame: WsFrame, policy: FramingPolicy) -> ClientMessage {
    match frame {
        WsFrame::Binary(data) => ClientMessage::Input(data),
        WsFrame::Ping(_) | WsFrame::Pong(_) => ClientMessage::Heartbeat,
        WsFrame::Close => ClientMessage::Close,
        WsFrame::Text(text) => match decode_envelope(&text) {
            Some(message) => message,
            None => match policy {
                FramingPolicy::Legacy => ClientMessage::Input(Bytes::from(text)),
                FramingPolicy::Strict => ClientMessage::Dropped(text),
            },
        },
    }
}

fn decode_envelope(text: &str) -> Option<ClientMessage> {
    // Only JSON objects can be envelopes
    if !text.trim_start().starts_with('{') {
        return None;
    }
    let envelope: Envelope = serde_json::from_str(text).ok()?;
    match envelope.kind.as_str() {
        "resize" => {
            let dimension = |key: &str| envelope.data.get(key).and_then(Value::as_i64).unwrap_or(0);
            Some(ClientMessage::Control(ControlMessage::Resize {
                cols: dimension("cols"),
                rows: dimension("rows"),
            }))
        }
        "ping" => Some(ClientMessage::Control(ControlMessage::Ping)),
        "pong" => Some(ClientMessage::Control(ControlMessage::Pong)),
        "input" => envelope
            .data
            .as_str()
            .map(|s| ClientMessage::Input(Bytes::copy_from_slice(s.as_bytes()))),
        _ => None,
    }
}

fn encode(kind: &str, data: Value) -> WsFrame {
    let envelope = Envelope {
        kind: kind.to_string(),
        data,
    };
    // Serializing a String key and a Value cannot fail
    WsFrame::Text(serde_json::to_string(&envelope).unwrap_or_default())
}

/// `{"type":"pong","data":<unix seconds>}`
#[must_use]
pub fn pong_frame(unix_seconds: i64) -> WsFrame {
    encode("pong", Value::from(unix_seconds))
}

/// `{"type":"error","data":"<message>"}`
#[must_use]
pub fn error_frame(message: &str) -> WsFrame {
    encode("error", Value::from(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> WsFrame {
        WsFrame::Text(s.to_string())
    }

    #[test]
    fn test_binary_is_always_input() {
        let frame = WsFrame::Binary(Bytes::from_static(br#"{"type":"ping"}"#));
        assert_eq!(
            decode_client_frame(frame, FramingPolicy::Strict),
            ClientMessage::Input(Bytes::from_static(br#"{"type":"ping"}"#))
        );
    }

    #[test]
    fn test_resize_envelope() {
        let msg = decode_client_frame(
            text(r#"{"type":"resize","data":{"cols":120,"rows":40}}"#),
            FramingPolicy::Legacy,
        );
        assert_eq!(
            msg,
            ClientMessage::Control(ControlMessage::Resize { cols: 120, rows: 40 })
        );
    }

    #[test]
    fn test_malformed_resize_stays_control() {
        let msg = decode_client_frame(
            text(r#"{"type":"resize","data":{"cols":"wide"}}"#),
            FramingPolicy::Legacy,
        );
        assert_eq!(
            msg,
            ClientMessage::Control(ControlMessage::Resize { cols: 0, rows: 0 })
        );
    }

    #[test]
    fn test_ping_with_any_data() {
        for raw in [
            r#"{"type":"ping"}"#,
            r#"{"type":"ping","data":12345}"#,
            r#"{"type":"ping","data":{"nested":[1,2]}}"#,
        ] {
            assert_eq!(
                decode_client_frame(text(raw), FramingPolicy::Strict),
                ClientMessage::Control(ControlMessage::Ping)
            );
        }
    }

    #[test]
    fn test_input_envelope() {
        let msg = decode_client_frame(
            text(r#"{"type":"input","data":"ls -la\n"}"#),
            FramingPolicy::Strict,
        );
        assert_eq!(msg, ClientMessage::Input(Bytes::from_static(b"ls -la\n")));
    }

    #[test]
    fn test_plain_text_legacy_vs_strict() {
        assert_eq!(
            decode_client_frame(text("ls\n"), FramingPolicy::Legacy),
            ClientMessage::Input(Bytes::from_static(b"ls\n"))
        );
        assert_eq!(
            decode_client_frame(text("ls\n"), FramingPolicy::Strict),
            ClientMessage::Dropped("ls\n".to_string())
        );
    }

    #[test]
    fn test_unknown_envelope_type_is_not_control() {
        let raw = r#"{"type":"exec","data":"rm -rf /"}"#;
        assert_eq!(
            decode_client_frame(text(raw), FramingPolicy::Legacy),
            ClientMessage::Input(Bytes::from(raw.to_string()))
        );
    }

    #[test]
    fn test_ws_ping_pong_are_heartbeats() {
        assert_eq!(
            decode_client_frame(WsFrame::Ping(Bytes::new()), FramingPolicy::Strict),
            ClientMessage::Heartbeat
        );
        assert_eq!(
            decode_client_frame(WsFrame::Pong(Bytes::new()), FramingPolicy::Strict),
            ClientMessage::Heartbeat
        );
    }

    #[test]
    fn test_pong_frame_shape() {
        let WsFrame::Text(body) = pong_frame(1_700_000_000) else {
            panic!("pong must be a text frame");
        };
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["type"], "pong");
        assert_eq!(value["data"], 1_700_000_000);
    }

    #[test]
    fn test_error_frame_shape() {
        let WsFrame::Text(body) = error_frame("SSH authentication failed for root@h:22") else {
            panic!("error must be a text frame");
        };
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"], "SSH authentication failed for root@h:22");
    }
}
