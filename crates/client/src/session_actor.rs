//! Session actor. Owns the SessionState and applies inputs sequentially.
//!
//! The session runs as one tokio task. Front ends talk to it through
//! `SessionHandle`, which sends `SessionCommand`s over an mpsc channel.
//! Reads are lock-free through `ArcSwap`; a `watch` channel carries the
//! revision of the latest published snapshot.

use std::sync::Arc;

use ace_protocol::ClientMessage;
use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::ids::IdSource;
use crate::state::SessionState;
use crate::transition::{transition, Effect, Input};
use crate::transport::{Transport, TransportEvent};

/// Commands accepted by the session actor
#[derive(Debug)]
pub enum SessionCommand {
    Connect,
    Disconnect { reply: oneshot::Sender<()> },
    SendMessage { text: String },
    Ping,
}

/// Handle to a running session actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SessionHandle {
    /// Spawn the actor for `state`, consuming `events` from `transport`.
    pub fn spawn(
        state: SessionState,
        transport: Transport,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        ids: Box<dyn IdSource>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(256);
        let snapshot = Arc::new(ArcSwap::from_pointee(state.clone()));
        let (revision, _) = watch::channel(state.revision);
        let revision = Arc::new(revision);

        let actor = SessionActor {
            state,
            transport,
            ids,
            snapshot: snapshot.clone(),
            revision: revision.clone(),
        };
        tokio::spawn(actor.run(command_rx, events));

        SessionHandle {
            command_tx,
            snapshot,
            revision,
        }
    }

    /// Open the link; history is requested once it is up.
    pub async fn connect(&self) {
        self.send(SessionCommand::Connect).await;
    }

    /// Close the link and stop reconnecting.
    ///
    /// The published snapshot shows `Disconnected` when this returns.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        self.send(SessionCommand::Disconnect { reply }).await;
        let _ = done.await;
    }

    /// Echo `text` locally and send it to the server.
    pub async fn send_message(&self, text: impl Into<String>) {
        self.send(SessionCommand::SendMessage { text: text.into() })
            .await;
    }

    /// Send a `connection.ping` probe.
    pub async fn ping(&self) {
        self.send(SessionCommand::Ping).await;
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionState> {
        self.snapshot.load_full()
    }

    /// Receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Wait until the published snapshot satisfies `pred`.
    pub async fn wait_for<F>(&self, mut pred: F) -> Arc<SessionState>
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut changes = self.subscribe();
        loop {
            let snapshot = self.snapshot();
            if pred(&snapshot) || changes.changed().await.is_err() {
                return snapshot;
            }
        }
    }

    async fn send(&self, cmd: SessionCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                event = "session.command.dropped",
                "Actor channel closed, command dropped"
            );
        }
    }
}

struct SessionActor {
    state: SessionState,
    transport: Transport,
    ids: Box<dyn IdSource>,
    snapshot: Arc<ArcSwap<SessionState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &mut events).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.apply(event.into()).await,
                    None => break,
                },
            }
        }

        debug!(
            component = "session_actor",
            event = "session.actor.stopped",
            "Session actor stopped"
        );
        self.transport.disconnect().await;
    }

    async fn handle_command(
        &mut self,
        cmd: SessionCommand,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        match cmd {
            SessionCommand::Connect => self.transport.connect().await,
            SessionCommand::Disconnect { reply } => {
                self.transport.disconnect().await;
                // Fold in what the transport emitted, Disconnected included
                while let Ok(event) = events.try_recv() {
                    self.apply(event.into()).await;
                }
                let _ = reply.send(());
            }
            SessionCommand::SendMessage { text } => self.apply(Input::SendText(text)).await,
            SessionCommand::Ping => self.transport.send(ClientMessage::ConnectionPing).await,
        }
    }

    async fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = transition(state, input, self.ids.as_mut());
        state.revision += 1;

        self.snapshot.store(Arc::new(state.clone()));
        self.revision.send_replace(state.revision);
        self.state = state;

        for effect in effects {
            match effect {
                Effect::Send(msg) => self.transport.send(msg).await,
                Effect::ReportServerError {
                    code,
                    message,
                    context,
                } => {
                    warn!(
                        component = "session_actor",
                        event = "session.server_error",
                        code = %code,
                        error_message = %message,
                        context = context.as_deref().unwrap_or(""),
                        "Server reported an error"
                    );
                }
            }
        }
    }
}

impl From<TransportEvent> for Input {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::StateChanged(state) => Input::ConnectionChanged(state),
            TransportEvent::Message(msg) => Input::Received(msg),
        }
    }
}
