//! ACE Protocol
//!
//! Frames exchanged between the ACE coordination server and chat clients.
//! Every frame is a JSON object with a dotted `type` tag and, for most
//! types, a `payload` object. Frames travel as WebSocket text messages.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::{ClientMessage, TextInputPayload};
pub use server::{ErrorPayload, HistoryPayload, ServerMessage, TextResponsePayload};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
