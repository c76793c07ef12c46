//! ACE chat client core
//!
//! A reconnecting WebSocket [`transport`] and a [`session_actor`] that folds
//! its events through the pure [`transition`] reducer into an ordered,
//! observable conversation.

pub mod config;
pub mod error;
pub mod ids;
pub mod reconnect;
pub mod session_actor;
pub mod state;
pub mod transition;
pub mod transport;

pub use config::ClientConfig;
pub use error::ClientError;
pub use ids::{IdSource, SequentialIds, UuidIds};
pub use reconnect::ReconnectPolicy;
pub use session_actor::SessionHandle;
pub use state::{ChatMessage, ConnectionState, SessionState};
pub use transport::{Transport, TransportEvent};

/// Spawn the transport and session for `config` and wire them together.
///
/// Must be called from within a tokio runtime. Nothing connects until
/// [`SessionHandle::connect`].
pub fn start(config: &ClientConfig) -> Result<SessionHandle, ClientError> {
    let url = config.ws_url()?;
    let (transport, events) = Transport::spawn(url, config.reconnect);

    let mut ids = UuidIds;
    let session_id = config.session_scoped.then(|| ids.next_id());

    Ok(SessionHandle::spawn(
        SessionState::new(session_id),
        transport,
        events,
        Box::new(ids),
    ))
}
