//! WebSocket transport
//!
//! [`TransportClient`] owns at most one socket. Socket I/O runs on a spawned
//! task per connection; everything the socket does is reported, in order, on
//! the event channel returned by [`TransportClient::new`].
//!
//! ```text
//! connect() ──► ReadyStateChange(Connecting)
//!                 ├─ handshake ok ──► ReadyStateChange(Open), Open, Message…
//!                 └─ handshake err ─► Error, ReadyStateChange(Closed), Close{1006}
//! disconnect() ─► ReadyStateChange(Closing) … ReadyStateChange(Closed), Close{1000}
//! ```
//!
//! Each connection gets a [`ConnectionId`] and every event is tagged with the
//! id of the socket it came from. Replacing a socket issues a new id, and a
//! task whose id is stale never emits again.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Endpoint;
use crate::protocol::ClientMessage;

/// Closed by this client
pub const CLOSE_NORMAL: u16 = 1000;
/// Closed by the server
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Handshake failed, or the stream ended without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// How long a client-initiated close waits for the server's close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Socket lifecycle stage, numbered as in the WebSocket API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Body of an inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Json(serde_json::Value),
    /// Frame that is not valid JSON
    Raw(String),
}

impl Inbound {
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Inbound::Json(value),
            Err(_) => Inbound::Raw(text),
        }
    }
}

/// Everything a socket reports
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ReadyStateChange(ReadyState),
    Open,
    Close { code: u16 },
    Message(Inbound),
    Error(String),
}

/// Identifies one call to [`Transport::connect`]
pub type ConnectionId = u64;

/// A [`TransportEvent`] and the connection it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEvent {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

/// What the session needs from a transport
pub trait Transport {
    /// Open a socket to `endpoint`, closing any socket already open
    fn connect(&mut self, endpoint: &Endpoint) -> ConnectionId;

    /// Close the socket with [`CLOSE_NORMAL`]; no-op when already closed
    fn disconnect(&mut self);

    /// Send one message; dropped unless the socket is open
    fn send(&self, message: &ClientMessage);

    fn ready_state(&self) -> ReadyState;
}

enum Outgoing {
    Text(String),
    Close(u16),
}

struct Shared {
    generation: ConnectionId,
    ready_state: ReadyState,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // Nobody listening is not an error
        let _ = self.events.send(SocketEvent {
            connection: self.generation,
            event,
        });
    }

    fn set_ready_state(&mut self, state: ReadyState) {
        if self.ready_state != state {
            self.ready_state = state;
            self.emit(TransportEvent::ReadyStateChange(state));
        }
    }
}

/// A socket task's view of the shared state
struct SocketHandle {
    generation: ConnectionId,
    shared: Arc<Mutex<Shared>>,
}

impl SocketHandle {
    fn emit(&self, event: TransportEvent) {
        let shared = self.shared.lock();
        if shared.generation == self.generation {
            shared.emit(event);
        }
    }

    /// Mark the socket open. False when it was replaced or a close was
    /// requested while the handshake ran.
    fn opened(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.generation != self.generation || shared.ready_state != ReadyState::Connecting {
            return false;
        }
        shared.set_ready_state(ReadyState::Open);
        shared.emit(TransportEvent::Open);
        true
    }

    fn finish(&self, code: u16) {
        let mut shared = self.shared.lock();
        if shared.generation == self.generation {
            shared.set_ready_state(ReadyState::Closed);
            shared.emit(TransportEvent::Close { code });
        }
    }
}

struct ActiveSocket {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

/// tokio-tungstenite backed [`Transport`]
pub struct TransportClient {
    shared: Arc<Mutex<Shared>>,
    socket: Option<ActiveSocket>,
}

impl TransportClient {
    /// Create a closed client and the receiving end of its event channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            generation: 0,
            ready_state: ReadyState::Closed,
            events,
        };
        let client = Self {
            shared: Arc::new(Mutex::new(shared)),
            socket: None,
        };
        (client, rx)
    }
}

impl Transport for TransportClient {
    fn connect(&mut self, endpoint: &Endpoint) -> ConnectionId {
        let uri = endpoint.uri();

        let generation = {
            let mut shared = self.shared.lock();
            if shared.ready_state != ReadyState::Closed {
                // Reported here, under the old id, because the old task goes quiet
                tracing::info!("Replacing open connection");
                shared.set_ready_state(ReadyState::Closed);
                shared.emit(TransportEvent::Close { code: CLOSE_NORMAL });
            }
            shared.generation += 1;
            shared.set_ready_state(ReadyState::Connecting);
            shared.generation
        };

        if let Some(old) = self.socket.take() {
            let _ = old.outgoing.send(Outgoing::Close(CLOSE_NORMAL));
        }

        tracing::info!("Connecting to {}", uri);
        let (outgoing, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle {
            generation,
            shared: Arc::clone(&self.shared),
        };
        tokio::spawn(run_socket(uri, rx, handle));

        self.socket = Some(ActiveSocket { outgoing });
        generation
    }

    fn disconnect(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };

        {
            let mut shared = self.shared.lock();
            match shared.ready_state {
                ReadyState::Closing | ReadyState::Closed => return,
                ReadyState::Connecting | ReadyState::Open => {
                    shared.set_ready_state(ReadyState::Closing)
                }
            }
        }

        tracing::info!("Disconnecting");
        let _ = socket.outgoing.send(Outgoing::Close(CLOSE_NORMAL));
    }

    fn send(&self, message: &ClientMessage) {
        if self.ready_state() != ReadyState::Open {
            tracing::debug!("Dropping {}: socket not open", message.type_tag());
            return;
        }
        let Some(socket) = self.socket.as_ref() else {
            return;
        };

        match message.encode() {
            Ok(text) => {
                tracing::debug!("→ {}", message.type_tag());
                let _ = socket.outgoing.send(Outgoing::Text(text));
            }
            Err(e) => tracing::warn!("Failed to encode {}: {}", message.type_tag(), e),
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready_state
    }
}

async fn run_socket(
    uri: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    handle: SocketHandle,
) {
    let handshake = connect_async(uri.as_str());
    tokio::pin!(handshake);

    // Before the socket opens the only command that can arrive is a close
    // (or the client going away), which abandons the handshake. A queued
    // close wins over a handshake that completes in the same poll.
    let ws = tokio::select! {
        biased;

        _ = outgoing.recv() => {
            tracing::debug!("Connection to {} abandoned before open", uri);
            handle.finish(CLOSE_NORMAL);
            return;
        }
        result = &mut handshake => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::warn!("WebSocket handshake with {} failed: {}", uri, e);
                handle.emit(TransportEvent::Error(e.to_string()));
                handle.finish(CLOSE_ABNORMAL);
                return;
            }
        },
    };

    let (mut sink, mut stream) = ws.split();

    // disconnect() or connect() got in between the handshake and here
    if !handle.opened() {
        tracing::debug!("Connection to {} closed right after the handshake", uri);
        close_gracefully(&mut sink, &mut stream, CLOSE_NORMAL).await;
        handle.finish(CLOSE_NORMAL);
        return;
    }
    tracing::info!("Connected to {}", uri);

    let code = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("← {} bytes", text.len());
                    handle.emit(TransportEvent::Message(Inbound::parse(text)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(CLOSE_NO_STATUS);
                    // Completes the closing handshake
                    let _ = sink.close().await;
                    break code;
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error: {}", e);
                    handle.emit(TransportEvent::Error(e.to_string()));
                    break CLOSE_ABNORMAL;
                }
                None => break CLOSE_ABNORMAL,
            },

            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!("WebSocket send failed: {}", e);
                        handle.emit(TransportEvent::Error(e.to_string()));
                        break CLOSE_ABNORMAL;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    close_gracefully(&mut sink, &mut stream, code).await;
                    break code;
                }
                None => {
                    close_gracefully(&mut sink, &mut stream, CLOSE_NORMAL).await;
                    break CLOSE_NORMAL;
                }
            }
        }
    };

    tracing::info!("Connection to {} closed (code {})", uri, code);
    handle.finish(code);
}

async fn close_gracefully<S, R>(sink: &mut S, stream: &mut R, code: u16)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Borrowed(""),
    };
    if sink.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }
    // Wait for the server's close frame so the socket shuts down cleanly
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while let Some(Ok(frame)) = stream.next().await {
            if frame.is_close() {
                break;
            }
        }
    })
    .await;
}
