//! Client/relay wire framing
//!
//! Frames are UTF-8 JSON arrays over a persistent per-relay socket.
//! Client to relay: `["EVENT", event]`, `["REQ", subId, filter]`,
//! `["CLOSE", subId]`. Relay to client: `["EVENT", subId, event]`,
//! `["OK", eventId, success, message]`, `["EOSE", subId]`,
//! `["NOTICE", message]`.
//!
//! Inbound frames pass a set of structural limits before shape matching so
//! a hostile relay cannot force unbounded parse cost. A frame that fails
//! any check is discarded by the caller; processing continues with the
//! next frame.

use crate::event::Event;
use crate::filter::Filter;
use serde_json::Value;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors from encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("array length {len} exceeds limit {max}")]
    ArrayTooLong { len: usize, max: usize },

    #[error("object key count {len} exceeds limit {max}")]
    TooManyKeys { len: usize, max: usize },

    #[error("nesting depth exceeds limit {0}")]
    TooDeep(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ----------------------------------------------------------------------------
// Frame Limits
// ----------------------------------------------------------------------------

/// Structural limits applied to every inbound frame.
#[derive(Debug, Clone)]
pub struct FrameLimits {
    /// Maximum frame size in bytes, checked before parsing.
    pub max_frame_bytes: usize,
    /// Maximum element count of any JSON array in the frame.
    pub max_array_len: usize,
    /// Maximum key count of any JSON object in the frame.
    pub max_object_keys: usize,
    /// Maximum nesting depth of arrays and objects.
    pub max_depth: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: 256 * 1024,
            max_array_len: 1024,
            max_object_keys: 256,
            max_depth: 16,
        }
    }
}

fn check_value(value: &Value, depth: usize, limits: &FrameLimits) -> Result<(), WireError> {
    if depth > limits.max_depth {
        return Err(WireError::TooDeep(limits.max_depth));
    }
    match value {
        Value::Array(items) => {
            if items.len() > limits.max_array_len {
                return Err(WireError::ArrayTooLong {
                    len: items.len(),
                    max: limits.max_array_len,
                });
            }
            for item in items {
                check_value(item, depth + 1, limits)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            if map.len() > limits.max_object_keys {
                return Err(WireError::TooManyKeys {
                    len: map.len(),
                    max: limits.max_object_keys,
                });
            }
            for item in map.values() {
                check_value(item, depth + 1, limits)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ----------------------------------------------------------------------------
// Client Messages
// ----------------------------------------------------------------------------

/// Messages sent from the client to a relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish a signed event: `["EVENT", event]`
    Event(Event),

    /// Open a subscription: `["REQ", subId, filter]`
    Req {
        subscription_id: String,
        filter: Filter,
    },

    /// Close a subscription: `["CLOSE", subId]`
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to the JSON array form sent on the socket.
    pub fn to_json(&self) -> Result<String, WireError> {
        let value = match self {
            ClientMessage::Event(event) => {
                Value::Array(vec![Value::String("EVENT".to_string()), serde_json::to_value(event)?])
            }
            ClientMessage::Req {
                subscription_id,
                filter,
            } => Value::Array(vec![
                Value::String("REQ".to_string()),
                Value::String(subscription_id.clone()),
                serde_json::to_value(filter)?,
            ]),
            ClientMessage::Close { subscription_id } => Value::Array(vec![
                Value::String("CLOSE".to_string()),
                Value::String(subscription_id.clone()),
            ]),
        };
        Ok(value.to_string())
    }
}

// ----------------------------------------------------------------------------
// Relay Messages
// ----------------------------------------------------------------------------

/// Messages received from a relay.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// Event matching a subscription: `["EVENT", subId, event]`
    Event {
        subscription_id: String,
        event: Event,
    },

    /// Publish acknowledgement: `["OK", eventId, success, message]`
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },

    /// End of stored events, advisory: `["EOSE", subId]`
    Eose { subscription_id: String },

    /// Human-readable notice: `["NOTICE", message]`
    Notice { message: String },
}

impl RelayMessage {
    /// Parse a frame with the default limits.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        Self::from_json_with_limits(text, &FrameLimits::default())
    }

    /// Parse a frame, enforcing the given structural limits first.
    pub fn from_json_with_limits(text: &str, limits: &FrameLimits) -> Result<Self, WireError> {
        if text.len() > limits.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                size: text.len(),
                max: limits.max_frame_bytes,
            });
        }

        let value: Value = serde_json::from_str(text)?;
        check_value(&value, 0, limits)?;

        let arr = value
            .as_array()
            .ok_or_else(|| WireError::InvalidFrame("frame is not an array".to_string()))?;
        if arr.is_empty() {
            return Err(WireError::InvalidFrame("empty array".to_string()));
        }

        let msg_type = arr[0]
            .as_str()
            .ok_or_else(|| WireError::InvalidFrame("first element not a string".to_string()))?;

        match msg_type {
            "EVENT" => {
                if arr.len() < 3 {
                    return Err(WireError::MissingField("subscription_id or event".to_string()));
                }
                let subscription_id = str_field(&arr[1], "subscription_id")?;
                let event: Event = serde_json::from_value(arr[2].clone())?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "OK" => {
                if arr.len() < 4 {
                    return Err(WireError::MissingField("OK fields".to_string()));
                }
                let event_id = str_field(&arr[1], "event_id")?;
                let success = arr[2]
                    .as_bool()
                    .ok_or_else(|| WireError::InvalidFrame("success not a boolean".to_string()))?;
                let message = arr[3].as_str().unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            "EOSE" => {
                if arr.len() < 2 {
                    return Err(WireError::MissingField("subscription_id".to_string()));
                }
                let subscription_id = str_field(&arr[1], "subscription_id")?;
                Ok(RelayMessage::Eose { subscription_id })
            }
            "NOTICE" => {
                if arr.len() < 2 {
                    return Err(WireError::MissingField("message".to_string()));
                }
                let message = str_field(&arr[1], "message")?;
                Ok(RelayMessage::Notice { message })
            }
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

fn str_field(value: &Value, name: &str) -> Result<String, WireError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WireError::InvalidFrame(format!("{} not a string", name)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> Event {
        Event {
            id: "a".repeat(64),
            pubkey: "b".repeat(64),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![],
            content: "hello".to_string(),
            sig: "c".repeat(128),
        }
    }

    #[test]
    fn test_client_message_event() {
        let json = ClientMessage::Event(test_event()).to_json().unwrap();
        assert!(json.starts_with("[\"EVENT\","));
        assert!(json.contains(&"a".repeat(64)));
    }

    #[test]
    fn test_client_message_req_is_three_elements() {
        let json = ClientMessage::Req {
            subscription_id: "sub1".to_string(),
            filter: Filter::new().kinds(vec![0]),
        }
        .to_json()
        .unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[0], "REQ");
        assert_eq!(arr[1], "sub1");
        assert!(arr[2].is_object());
    }

    #[test]
    fn test_client_message_close() {
        let json = ClientMessage::Close {
            subscription_id: "sub1".to_string(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"["CLOSE","sub1"]"#);
    }

    #[test]
    fn test_parse_event_message() {
        let text = format!(
            r#"["EVENT","sub1",{{"id":"{}","pubkey":"{}","created_at":123,"kind":1,"tags":[],"content":"hi","sig":"{}"}}]"#,
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(128)
        );
        match RelayMessage::from_json(&text).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(event.content, "hi");
            }
            other => panic!("expected EVENT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ok_accepted() {
        let text = r#"["OK","event123",true,""]"#;
        match RelayMessage::from_json(text).unwrap() {
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => {
                assert_eq!(event_id, "event123");
                assert!(success);
                assert_eq!(message, "");
            }
            other => panic!("expected OK, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ok_rejected() {
        let text = r#"["OK","event123",false,"duplicate: already have this event"]"#;
        match RelayMessage::from_json(text).unwrap() {
            RelayMessage::Ok {
                success, message, ..
            } => {
                assert!(!success);
                assert!(message.contains("duplicate"));
            }
            other => panic!("expected OK, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_eose() {
        match RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap() {
            RelayMessage::Eose { subscription_id } => assert_eq!(subscription_id, "sub1"),
            other => panic!("expected EOSE, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notice() {
        match RelayMessage::from_json(r#"["NOTICE","rate limited"]"#).unwrap() {
            RelayMessage::Notice { message } => assert_eq!(message, "rate limited"),
            other => panic!("expected NOTICE, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(RelayMessage::from_json("not json").is_err());
        assert!(RelayMessage::from_json("{}").is_err());
        assert!(RelayMessage::from_json("[]").is_err());
        assert!(RelayMessage::from_json(r#"[42]"#).is_err());
        assert!(RelayMessage::from_json(r#"["UNKNOWN","x"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["OK","id","yes",""]"#).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected_before_parse() {
        let limits = FrameLimits {
            max_frame_bytes: 64,
            ..FrameLimits::default()
        };
        let big = format!(r#"["NOTICE","{}"]"#, "x".repeat(100));
        match RelayMessage::from_json_with_limits(&big, &limits) {
            Err(WireError::FrameTooLarge { size, max }) => {
                assert!(size > max);
            }
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let limits = FrameLimits {
            max_depth: 4,
            ..FrameLimits::default()
        };
        let nested = format!(r#"["NOTICE",{}"x"{}]"#, "[".repeat(8), "]".repeat(8));
        assert!(matches!(
            RelayMessage::from_json_with_limits(&nested, &limits),
            Err(WireError::TooDeep(_))
        ));
    }

    #[test]
    fn test_long_array_rejected() {
        let limits = FrameLimits {
            max_array_len: 8,
            ..FrameLimits::default()
        };
        let tags: Vec<String> = (0..20).map(|i| format!("[\"t\",\"{}\"]", i)).collect();
        let text = format!(
            r#"["EVENT","sub1",{{"id":"x","pubkey":"y","created_at":1,"kind":1,"tags":[{}],"content":"","sig":"z"}}]"#,
            tags.join(",")
        );
        assert!(matches!(
            RelayMessage::from_json_with_limits(&text, &limits),
            Err(WireError::ArrayTooLong { .. })
        ));
    }

    #[test]
    fn test_too_many_object_keys_rejected() {
        let limits = FrameLimits {
            max_object_keys: 4,
            ..FrameLimits::default()
        };
        let keys: Vec<String> = (0..10).map(|i| format!("\"k{}\":1", i)).collect();
        let text = format!(r#"["EVENT","sub1",{{{}}}]"#, keys.join(","));
        assert!(matches!(
            RelayMessage::from_json_with_limits(&text, &limits),
            Err(WireError::TooManyKeys { .. })
        ));
    }
}
