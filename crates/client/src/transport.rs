//! WebSocket transport with automatic reconnection
//!
//! [`Transport`] is a cheap handle to a driver task. The driver exclusively
//! owns the socket reader, the in-flight open, and the reconnect timer, and
//! runs every lifecycle change through [`crate::reconnect::transition`].
//! Parsed frames and link changes leave on one ordered event channel.
//! Writes go through a per-socket writer task.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use ace_protocol::{ClientMessage, ServerMessage};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, timeout, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::reconnect::{self, LinkEffect, LinkInput, ReconnectPolicy, ReconnectState};
use crate::state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type OpenResult = Result<WsStream, tungstenite::Error>;

/// Frames queued for the writer task before new sends are dropped.
const OUTBOUND_CAPACITY: usize = 100;
/// A single write (or the closing handshake) that takes longer than this
/// ends the writer task.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the transport reports to its single consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    Message(ServerMessage),
}

/// Commands accepted by the driver task
#[derive(Debug)]
pub enum TransportCommand {
    Connect,
    Send(ClientMessage),
    Disconnect { reply: oneshot::Sender<()> },
}

/// Handle to a running transport driver (cheap to Clone).
///
/// The driver stops and closes its socket once every handle is dropped.
#[derive(Clone)]
pub struct Transport {
    command_tx: mpsc::Sender<TransportCommand>,
}

impl Transport {
    /// Spawn a driver for `url`, returning a handle and the event stream.
    ///
    /// Nothing is opened until [`Transport::connect`] is called.
    pub fn spawn(
        url: String,
        policy: ReconnectPolicy,
    ) -> (Transport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::channel(256);
        // Unbounded so the driver never blocks on a slow consumer
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url,
            policy,
            link: ReconnectState::default(),
            events: event_tx,
            opening: None,
            writer: None,
            reader: None,
            timer: None,
        };
        tokio::spawn(driver.run(command_rx));

        (Transport { command_tx }, event_rx)
    }

    /// Create a handle from a pre-built command channel.
    #[cfg(test)]
    pub(crate) fn from_parts(command_tx: mpsc::Sender<TransportCommand>) -> Self {
        Self { command_tx }
    }

    /// Enable reconnection and open a socket unless one is already
    /// open or opening.
    pub async fn connect(&self) {
        self.command(TransportCommand::Connect).await;
    }

    /// Transmit `msg` if the socket is open; dropped silently otherwise.
    pub async fn send(&self, msg: ClientMessage) {
        self.command(TransportCommand::Send(msg)).await;
    }

    /// Disable reconnection, cancel any pending reconnect, and close the
    /// socket. `Disconnected` has been emitted by the time this returns.
    pub async fn disconnect(&self) {
        let (reply, done) = oneshot::channel();
        self.command(TransportCommand::Disconnect { reply }).await;
        let _ = done.await;
    }

    async fn command(&self, cmd: TransportCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "transport",
                event = "transport.command.dropped",
                "Transport driver stopped, command dropped"
            );
        }
    }
}

struct Driver {
    url: String,
    policy: ReconnectPolicy,
    link: ReconnectState,
    events: mpsc::UnboundedSender<TransportEvent>,
    opening: Option<JoinHandle<OpenResult>>,
    writer: Option<Writer>,
    reader: Option<WsReader>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    async fn run(mut self, mut command_rx: mpsc::Receiver<TransportCommand>) {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                opened = wait_open(&mut self.opening) => self.handle_opened(opened),
                frame = next_frame(&mut self.reader) => self.handle_frame(frame),
                () = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.apply(LinkInput::TimerFired);
                }
            }
        }

        debug!(
            component = "transport",
            event = "transport.driver.stopped",
            url = %self.url,
            "All transport handles dropped"
        );
        self.close_socket();
    }

    fn handle_command(&mut self, cmd: TransportCommand) {
        match cmd {
            TransportCommand::Connect => self.apply(LinkInput::Connect),
            TransportCommand::Send(msg) => self.send(msg),
            TransportCommand::Disconnect { reply } => {
                self.apply(LinkInput::Disconnect);
                let _ = reply.send(());
            }
        }
    }

    /// Run one input through the link state machine and execute its effects.
    fn apply(&mut self, input: LinkInput) {
        let (link, effects) =
            reconnect::transition(std::mem::take(&mut self.link), input, &self.policy);
        self.link = link;

        for effect in effects {
            match effect {
                LinkEffect::Open => self.start_open(),
                LinkEffect::Close => self.close_socket(),
                LinkEffect::ArmTimer(delay) => {
                    info!(
                        component = "transport",
                        event = "transport.reconnect.scheduled",
                        attempt = self.link.attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect scheduled"
                    );
                    self.timer = Some(Box::pin(sleep(delay)));
                }
                LinkEffect::CancelTimer => self.timer = None,
                LinkEffect::Emit(state) => {
                    info!(
                        component = "transport",
                        event = "transport.state.changed",
                        state = ?state,
                        "Connection state changed"
                    );
                    self.emit(TransportEvent::StateChanged(state));
                }
            }
        }
    }

    fn start_open(&mut self) {
        self.close_socket();
        debug!(
            component = "transport",
            event = "ws.open.started",
            url = %self.url,
            "Opening WebSocket"
        );
        let url = self.url.clone();
        self.opening = Some(tokio::spawn(async move {
            tokio_tungstenite::connect_async(url)
                .await
                .map(|(stream, _response)| stream)
        }));
    }

    fn handle_opened(&mut self, opened: Result<OpenResult, JoinError>) {
        self.opening = None;
        match opened {
            Ok(Ok(stream)) => {
                let (sink, reader) = stream.split();
                self.writer = Some(Writer::spawn(sink));
                self.reader = Some(reader);
                self.apply(LinkInput::Opened);
            }
            Ok(Err(e)) => {
                warn!(
                    component = "transport",
                    event = "ws.open.failed",
                    url = %self.url,
                    error = %e,
                    "WebSocket open failed"
                );
                self.apply(LinkInput::Closed);
            }
            Err(e) => {
                error!(
                    component = "transport",
                    event = "ws.open.panicked",
                    error = %e,
                    "WebSocket open task failed"
                );
                self.apply(LinkInput::Closed);
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.dispatch_text(text.as_str()),
            Some(Ok(Message::Binary(data))) => {
                debug!(
                    component = "transport",
                    event = "ws.frame.binary_ignored",
                    len = data.len(),
                    "Ignoring binary frame"
                );
            }
            Some(Ok(Message::Close(close))) => {
                info!(
                    component = "transport",
                    event = "ws.closed",
                    close = ?close,
                    "Server closed the connection"
                );
                self.socket_lost();
            }
            // Ping/pong are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                // The stream is finished after an error; the loss below is
                // the only transition it causes.
                warn!(
                    component = "transport",
                    event = "ws.error",
                    error = %e,
                    "WebSocket error"
                );
                self.socket_lost();
            }
            None => {
                info!(
                    component = "transport",
                    event = "ws.closed",
                    "WebSocket stream ended"
                );
                self.socket_lost();
            }
        }
    }

    fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(msg) => {
                debug!(
                    component = "transport",
                    event = "ws.frame.received",
                    kind = msg.kind(),
                    "Frame received"
                );
                self.emit(TransportEvent::Message(msg));
            }
            Err(e) => {
                warn!(
                    component = "transport",
                    event = "ws.frame.malformed",
                    error = %e,
                    len = text.len(),
                    "Dropping malformed frame"
                );
            }
        }
    }

    /// Queue `msg` for the writer task. Never waits on the socket.
    fn send(&mut self, msg: ClientMessage) {
        let Some(writer) = self.writer.as_ref() else {
            debug!(
                component = "transport",
                event = "ws.send.not_open",
                kind = msg.kind(),
                "Socket not open, dropping outbound frame"
            );
            return;
        };

        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!(
                    component = "transport",
                    event = "ws.send.serialize_failed",
                    kind = msg.kind(),
                    error = %e,
                    "Failed to serialize client message"
                );
                return;
            }
        };

        match writer.outbound.try_send(Message::Text(json.into())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(
                component = "transport",
                event = "ws.send.backlogged",
                kind = msg.kind(),
                "Outbound queue full, dropping frame"
            ),
            // The reader observes the loss and drives the reconnect
            Err(TrySendError::Closed(_)) => debug!(
                component = "transport",
                event = "ws.send.writer_gone",
                kind = msg.kind(),
                "Writer stopped, dropping frame"
            ),
        }
    }

    fn socket_lost(&mut self) {
        self.writer = None;
        self.reader = None;
        self.apply(LinkInput::Closed);
    }

    /// Abort an in-flight open and close the current socket, if any.
    fn close_socket(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        self.reader = None;
        // Dropping the queue lets the writer flush and send Close
        self.writer = None;
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!(
                component = "transport",
                event = "transport.event.dropped",
                "Event receiver dropped"
            );
        }
    }
}

/// Per-socket writer: drains the outbound queue into the sink so a peer
/// that stops reading stalls only this task, never the driver.
struct Writer {
    outbound: mpsc::Sender<Message>,
}

impl Writer {
    fn spawn(sink: WsSink) -> Self {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(write_loop(sink, rx));
        Writer { outbound }
    }
}

async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<Message>) {
    while let Some(frame) = rx.recv().await {
        match timeout(WRITE_TIMEOUT, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(
                    component = "transport",
                    event = "ws.send.failed",
                    error = %e,
                    "WebSocket send failed"
                );
                return;
            }
            Err(_) => {
                warn!(
                    component = "transport",
                    event = "ws.send.timed_out",
                    timeout_ms = WRITE_TIMEOUT.as_millis() as u64,
                    "WebSocket send timed out, abandoning writer"
                );
                return;
            }
        }
    }
    let _ = timeout(WRITE_TIMEOUT, sink.close()).await;
}

async fn wait_open(opening: &mut Option<JoinHandle<OpenResult>>) -> Result<OpenResult, JoinError> {
    match opening {
        Some(handle) => handle.await,
        None => pending().await,
    }
}

async fn next_frame(reader: &mut Option<WsReader>) -> Option<Result<Message, tungstenite::Error>> {
    match reader {
        Some(reader) => reader.next().await,
        None => pending().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    /// An address nothing listens on.
    fn dead_addr() -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
        listener.local_addr().expect("probe addr")
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: 50,
            max_delay_ms: 50,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn failed_open_schedules_reconnect() {
        let url = format!("ws://{}/ws", dead_addr());
        let (transport, mut events) = Transport::spawn(url, fast_policy());

        transport.connect().await;

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Reconnecting)
        );
        // The timer fires and the next attempt fails too
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Reconnecting)
        );

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let url = format!("ws://{}/ws", dead_addr());
        let (transport, mut events) = Transport::spawn(url, fast_policy());

        transport.connect().await;
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Reconnecting)
        );

        transport.disconnect().await;

        // Disconnected is already queued when disconnect returns
        loop {
            match events.try_recv() {
                Ok(TransportEvent::StateChanged(ConnectionState::Disconnected)) => break,
                Ok(TransportEvent::StateChanged(ConnectionState::Reconnecting)) => continue,
                other => panic!("unexpected event after disconnect: {:?}", other),
            }
        }

        // Several timer periods pass without another attempt
        assert!(timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn send_while_not_open_is_dropped() {
        let url = format!("ws://{}/ws", dead_addr());
        let (transport, mut events) = Transport::spawn(url, fast_policy());

        transport.send(ClientMessage::HistoryRequest).await;
        transport.disconnect().await;

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Disconnected)
        );
        assert!(events.try_recv().is_err());
    }

    /// A ws server whose first connection is dropped right after the
    /// handshake; later connections are accepted and held open.
    async fn flaky_server() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind server");
        let addr = listener.local_addr().expect("server addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            let mut first = true;
            while let Ok((tcp, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
                if first {
                    first = false;
                    drop(ws);
                } else {
                    held.push(ws);
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn dropped_socket_reconnects_once() {
        let url = format!("ws://{}/ws", flaky_server().await);
        let (transport, mut events) = Transport::spawn(url, fast_policy());

        transport.connect().await;

        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Connected)
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Reconnecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Connected)
        );
        // One lost socket, one backoff step
        assert!(timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err());

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn stalled_peer_does_not_block_disconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind server");
        let url = format!("ws://{}/ws", listener.local_addr().expect("server addr"));
        let (held_tx, held_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
            // Never read, so the client's writes back up
            let _ = held_tx.send(ws);
        });

        let (transport, mut events) = Transport::spawn(url, fast_policy());
        transport.connect().await;
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Connected)
        );

        let big = "x".repeat(1 << 20);
        for _ in 0..64 {
            transport
                .send(ClientMessage::user_text(big.clone(), None))
                .await;
        }

        timeout(Duration::from_secs(2), transport.disconnect())
            .await
            .expect("disconnect blocked behind a stalled write");
        assert_eq!(
            next_event(&mut events).await,
            TransportEvent::StateChanged(ConnectionState::Disconnected)
        );
        drop(held_rx);
    }

    #[tokio::test]
    async fn driver_stops_when_handles_drop() {
        let url = format!("ws://{}/ws", dead_addr());
        let (transport, mut events) = Transport::spawn(url, fast_policy());
        drop(transport);

        let closed = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("driver did not stop");
        assert!(closed.is_none());
    }
}
