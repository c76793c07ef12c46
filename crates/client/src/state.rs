//! Session state

use ace_protocol::Role;
use serde::{Deserialize, Serialize};

/// Link status as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// One rendered conversation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

/// Everything a front end needs to draw the conversation.
///
/// Published as an immutable snapshot after every applied input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Insertion-ordered; the only source of truth for rendering.
    pub messages: Vec<ChatMessage>,
    pub is_streaming: bool,
    pub history_loaded: bool,
    pub connection_state: ConnectionState,
    /// Attached to outgoing user input when set.
    pub session_id: Option<String>,
    /// Bumped by the session actor on every applied input.
    pub revision: u64,
}

impl SessionState {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            messages: Vec::new(),
            is_streaming: false,
            history_loaded: false,
            connection_state: ConnectionState::Disconnected,
            session_id,
            revision: 0,
        }
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(None)
    }
}
