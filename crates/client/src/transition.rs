//! Pure session transition function
//!
//! All chat semantics live here as a pure, synchronous function:
//! `transition(state, input, ids) -> (state, effects)`.
//! No IO and no async, so it is unit-testable on its own.

use ace_protocol::{ClientMessage, HistoryEntry, Role, ServerMessage, TextResponsePayload};

use crate::ids::IdSource;
use crate::state::{ChatMessage, ConnectionState, SessionState};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    /// The transport changed link state.
    ConnectionChanged(ConnectionState),
    /// The transport delivered a parsed frame.
    Received(ServerMessage),
    /// The user submitted text.
    SendText(String),
}

// ---------------------------------------------------------------------------
// Effects: IO to be executed by the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(ClientMessage),
    ReportServerError {
        code: String,
        message: String,
        context: Option<String>,
    },
}

/// Pure, synchronous session transition.
///
/// Given the current state and an input, returns the new state and the
/// effects (outbound frames, error reports) to execute.
pub fn transition(
    mut state: SessionState,
    input: Input,
    ids: &mut dyn IdSource,
) -> (SessionState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();

    match input {
        // -- Link -------------------------------------------------------------
        Input::ConnectionChanged(connection) => {
            state.connection_state = connection;
            match connection {
                ConnectionState::Connected => {
                    // History is re-fetched on every fresh link
                    state.history_loaded = false;
                    effects.push(Effect::Send(ClientMessage::HistoryRequest));
                }
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    // The partial assistant message stays as-is
                    state.is_streaming = false;
                }
            }
        }

        // -- Inbound frames ---------------------------------------------------
        Input::Received(ServerMessage::HistoryResponse { payload }) => {
            state.messages = history_to_messages(payload.messages, ids);
            state.history_loaded = true;
        }

        Input::Received(ServerMessage::AssistantResponseText { payload }) => {
            apply_assistant_text(&mut state, payload, ids);
        }

        Input::Received(ServerMessage::Error { payload }) => {
            effects.push(Effect::ReportServerError {
                code: payload.code,
                message: payload.message,
                context: payload.context,
            });
        }

        Input::Received(ServerMessage::ConnectionPong) => {}

        // -- Outbound ---------------------------------------------------------
        Input::SendText(text) => {
            state.messages.push(ChatMessage {
                id: ids.next_id(),
                role: Role::User,
                content: text.clone(),
            });
            effects.push(Effect::Send(ClientMessage::user_text(
                text,
                state.session_id.clone(),
            )));
        }
    }

    (state, effects)
}

fn apply_assistant_text(
    state: &mut SessionState,
    payload: TextResponsePayload,
    ids: &mut dyn IdSource,
) {
    let TextResponsePayload {
        text, is_partial, ..
    } = payload;
    state.is_streaming = is_partial;

    match state.messages.last_mut() {
        Some(last) if last.role == Role::Assistant => {
            if is_partial {
                last.content.push_str(&text);
            } else {
                // The final payload is authoritative
                last.content = text;
            }
        }
        _ => state.messages.push(ChatMessage {
            id: ids.next_id(),
            role: Role::Assistant,
            content: text,
        }),
    }
}

fn history_to_messages(entries: Vec<HistoryEntry>, ids: &mut dyn IdSource) -> Vec<ChatMessage> {
    entries
        .into_iter()
        .filter(|entry| entry.role != Role::Unknown)
        .map(|entry| ChatMessage {
            id: ids.next_id(),
            role: entry.role,
            content: entry.content,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
