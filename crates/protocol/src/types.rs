//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Author of a conversation entry.
///
/// The server stores roles as free-form strings; anything other than
/// `user` or `assistant` decodes to [`Role::Unknown`] instead of failing
/// the whole frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    #[serde(other)]
    Unknown,
}

/// One entry of the server-held conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}
