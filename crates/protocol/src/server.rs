//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::HistoryEntry;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A chunk (partial) or the complete text (final) of an assistant reply
    #[serde(rename = "assistant.response.text")]
    AssistantResponseText { payload: TextResponsePayload },

    /// The durable conversation, oldest first
    #[serde(rename = "history.response")]
    HistoryResponse { payload: HistoryPayload },

    #[serde(rename = "error")]
    Error { payload: ErrorPayload },

    #[serde(rename = "connection.pong")]
    ConnectionPong,
}

impl ServerMessage {
    /// Wire `type` tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::AssistantResponseText { .. } => "assistant.response.text",
            ServerMessage::HistoryResponse { .. } => "history.response",
            ServerMessage::Error { .. } => "error",
            ServerMessage::ConnectionPong => "connection.pong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResponsePayload {
    pub text: String,
    pub is_partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPayload {
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
