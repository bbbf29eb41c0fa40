//! Wire frame types for the client <-> hub protocol (spec §6).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::ClientId;

/// Parse failure for an inbound text frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
    #[error("missing or invalid action field")]
    MissingAction,
    #[error("field '{0}' is required for this action")]
    MissingField(&'static str),
}

/// A parsed inbound client frame. [`ClientAction::Unknown`] carries the
/// raw action name and full JSON object so it can be forwarded verbatim
/// to the Handler Bridge (spec §4.5).
#[derive(Debug, Clone)]
pub enum ClientAction {
    Authenticate { token: String },
    JoinChannel { channel: String, data: Value },
    LeaveChannel { channel: String, data: Value },
    SendMessage { channel: String, event: String, data: Value },
    Ping,
    Unknown { action: String, raw: Value },
}

/// Parses a raw inbound text frame into a [`ClientAction`].
///
/// # Errors
///
/// [`FrameError::MalformedJson`] if `text` is not a JSON object;
/// [`FrameError::MissingAction`] if `action` is absent or not a string;
/// [`FrameError::MissingField`] if a known action is missing a required
/// field.
pub fn parse_client_frame(text: &str) -> Result<ClientAction, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| FrameError::MalformedJson(err.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(FrameError::MalformedJson(
            "frame must be a JSON object".to_string(),
        ));
    };

    let action = fields
        .remove("action")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(FrameError::MissingAction)?;

    match action.as_str() {
        "authenticate" => {
            let token = take_string(&mut fields, "token")?;
            Ok(ClientAction::Authenticate { token })
        }
        "join_channel" => {
            let channel = take_string(&mut fields, "channel")?;
            let data = fields.remove("data").unwrap_or(Value::Null);
            Ok(ClientAction::JoinChannel { channel, data })
        }
        "leave_channel" => {
            let channel = take_string(&mut fields, "channel")?;
            let data = fields.remove("data").unwrap_or(Value::Null);
            Ok(ClientAction::LeaveChannel { channel, data })
        }
        "send_message" => {
            let channel = take_string(&mut fields, "channel")?;
            let event = take_string(&mut fields, "event")?;
            let data = fields.remove("data").unwrap_or(Value::Null);
            Ok(ClientAction::SendMessage {
                channel,
                event,
                data,
            })
        }
        "ping" => Ok(ClientAction::Ping),
        other => Ok(ClientAction::Unknown {
            action: other.to_string(),
            raw: Value::Object(fields),
        }),
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &'static str) -> Result<String, FrameError> {
    fields
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(FrameError::MissingField(key))
}

/// A frame sent to a client: `{id, channel?, event, data, user_id?,
/// username?, timestamp}` (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub event: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ServerFrame {
    #[must_use]
    pub fn new(id: ClientId, event: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.0,
            channel: None,
            event: event.into(),
            data,
            user_id: None,
            username: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_sender(mut self, user_id: Option<String>, username: Option<String>) -> Self {
        self.user_id = user_id;
        self.username = username;
        self
    }

    #[must_use]
    pub fn error(id: ClientId, message: impl Into<String>) -> Self {
        Self::new(id, "error", serde_json::json!({"error": message.into()}))
    }

    /// Serializes to a single-line JSON text frame.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization failures, which cannot occur
    /// for this type (all fields are infallible to serialize) but are
    /// surfaced rather than unwrapped to avoid panicking in a connection
    /// task on a future field addition.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_authenticate() {
        let action = parse_client_frame(r#"{"action":"authenticate","token":"abc"}"#).unwrap();
        assert!(matches!(action, ClientAction::Authenticate { token } if token == "abc"));
    }

    #[test]
    fn parses_join_channel_with_data() {
        let action =
            parse_client_frame(r#"{"action":"join_channel","channel":"room1","data":{"x":1}}"#)
                .unwrap();
        match action {
            ClientAction::JoinChannel { channel, data } => {
                assert_eq!(channel, "room1");
                assert_eq!(data, json!({"x": 1}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn join_channel_without_data_defaults_null() {
        let action = parse_client_frame(r#"{"action":"join_channel","channel":"room1"}"#).unwrap();
        match action {
            ClientAction::JoinChannel { data, .. } => assert_eq!(data, Value::Null),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_send_message() {
        let action = parse_client_frame(
            r#"{"action":"send_message","channel":"room1","event":"chat","data":{"text":"hi"}}"#,
        )
        .unwrap();
        match action {
            ClientAction::SendMessage {
                channel,
                event,
                data,
            } => {
                assert_eq!(channel, "room1");
                assert_eq!(event, "chat");
                assert_eq!(data, json!({"text": "hi"}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_ping() {
        let action = parse_client_frame(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(action, ClientAction::Ping));
    }

    #[test]
    fn unknown_action_is_forwarded_raw() {
        let action = parse_client_frame(r#"{"action":"custom_op","foo":"bar"}"#).unwrap();
        match action {
            ClientAction::Unknown { action, raw } => {
                assert_eq!(action, "custom_op");
                assert_eq!(raw, json!({"foo": "bar"}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_action_is_rejected() {
        let err = parse_client_frame(r#"{"foo":"bar"}"#).unwrap_err();
        assert_eq!(err, FrameError::MissingAction);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = parse_client_frame(r#"{"action":"authenticate"}"#).unwrap_err();
        assert_eq!(err, FrameError::MissingField("token"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = parse_client_frame("not json").unwrap_err();
        assert!(matches!(err, FrameError::MalformedJson(_)));
    }

    #[test]
    fn server_frame_omits_absent_optional_fields() {
        let frame = ServerFrame::new(ClientId(1), "pong", Value::Null);
        let json = frame.to_json().unwrap();
        assert!(!json.contains("channel"));
        assert!(!json.contains("user_id"));
    }

    #[test]
    fn server_frame_error_shape() {
        let frame = ServerFrame::error(ClientId(1), "Channel requires authentication");
        assert_eq!(frame.event, "error");
        assert_eq!(
            frame.data,
            json!({"error": "Channel requires authentication"})
        );
    }
}
