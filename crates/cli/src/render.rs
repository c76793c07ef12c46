//! Incremental terminal rendering of session snapshots.
//!
//! Each snapshot is diffed against what has already been written so
//! streamed assistant text appears as it arrives instead of redrawing.

use ace_client::{ConnectionState, SessionState};
use ace_protocol::Role;
use console::style;

#[derive(Debug, Default)]
pub struct Renderer {
    /// Ids already written, in order.
    shown: Vec<String>,
    /// Assistant message still streaming on the current line: (id, text written).
    open: Option<(String, String)>,
    connection: Option<ConnectionState>,
}

impl Renderer {
    /// Text to write so the terminal reflects `snapshot`.
    pub fn render(&mut self, snapshot: &SessionState) -> String {
        let mut out = String::new();

        if self.connection != Some(snapshot.connection_state) {
            self.close_line(&mut out);
            self.connection = Some(snapshot.connection_state);
            out.push_str(&format!("{}\n", connection_banner(snapshot.connection_state)));
        }

        let is_prefix = self.shown.len() <= snapshot.messages.len()
            && self
                .shown
                .iter()
                .zip(&snapshot.messages)
                .all(|(id, message)| *id == message.id);
        if !is_prefix {
            // History replaced the conversation
            self.close_line(&mut out);
            self.shown.clear();
            out.push_str(&format!("{}\n", style("── history ──").dim()));
        }

        if let Some((id, written)) = self.open.as_mut() {
            if let Some(message) = snapshot.messages.iter().find(|m| m.id == *id) {
                if let Some(rest) = message.content.strip_prefix(written.as_str()) {
                    out.push_str(rest);
                } else {
                    // Final text differs from the streamed chunks
                    out.push('\n');
                    out.push_str(&format!("{} {}", label(message.role), message.content));
                }
                *written = message.content.clone();
            }
        }

        let last = snapshot.messages.len().saturating_sub(1);
        for (index, message) in snapshot.messages.iter().enumerate().skip(self.shown.len()) {
            self.close_line(&mut out);
            out.push_str(&format!("{} {}", label(message.role), message.content));
            self.shown.push(message.id.clone());

            if index == last && snapshot.is_streaming && message.role == Role::Assistant {
                self.open = Some((message.id.clone(), message.content.clone()));
            } else {
                out.push('\n');
            }
        }

        if !snapshot.is_streaming {
            self.close_line(&mut out);
        }

        out
    }

    fn close_line(&mut self, out: &mut String) {
        if self.open.take().is_some() {
            out.push('\n');
        }
    }
}

fn label(role: Role) -> String {
    match role {
        Role::User => style("you:").cyan().bold().to_string(),
        Role::Assistant => style("ace:").green().bold().to_string(),
        Role::Unknown => style("???:").dim().to_string(),
    }
}

fn connection_banner(state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => style("[connected]").green().to_string(),
        ConnectionState::Reconnecting => style("[reconnecting…]").yellow().to_string(),
        ConnectionState::Disconnected => style("[disconnected]").red().to_string(),
    }
}

/// One-line summary for `/status`.
pub fn status_line(snapshot: &SessionState) -> String {
    format!(
        "connection={:?} history_loaded={} streaming={} messages={}",
        snapshot.connection_state,
        snapshot.history_loaded,
        snapshot.is_streaming,
        snapshot.messages.len()
    )
}
