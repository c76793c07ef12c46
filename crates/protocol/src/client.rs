//! Client → Server messages

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Text typed by the user
    #[serde(rename = "user.input.text")]
    UserInputText { payload: TextInputPayload },

    /// Ask for the durable conversation history
    #[serde(rename = "history.request")]
    HistoryRequest,

    /// Liveness probe, answered with `connection.pong`
    #[serde(rename = "connection.ping")]
    ConnectionPing,
}

impl ClientMessage {
    /// Build a `user.input.text` frame.
    pub fn user_text(text: impl Into<String>, session_id: Option<String>) -> Self {
        ClientMessage::UserInputText {
            payload: TextInputPayload {
                text: text.into(),
                session_id,
            },
        }
    }

    /// Wire `type` tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::UserInputText { .. } => "user.input.text",
            ClientMessage::HistoryRequest => "history.request",
            ClientMessage::ConnectionPing => "connection.ping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInputPayload {
    pub text: String,
    /// Only present when the client scopes its input to a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
