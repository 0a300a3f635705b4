//! Session lifecycle and the auth/subscribe handshake
//!
//! ```text
//!  Disconnected ──connect()──► Connecting ──open──► AwaitingAuth
//!                                                     │  WELCOME → send AUTH_REQ
//!                                                     │  AUTH_RES{authorized}
//!                                                     ▼
//!        Subscribed ◄──SUBSCRIBE{subscribed}── AuthenticatedUnsubscribed
//!            │                                        ▲
//!            └──────────────UNSUBSCRIBE───────────────┘
//!
//!  any close ──► Disconnected (caches cleared)
//! ```
//!
//! The session owns the transport, the connection settings and the block
//! cache. It is driven by feeding it the transport's [`SocketEvent`]s in order.

use std::fmt;

use crate::commands::CommandFacade;
use crate::config::ConnectionSettings;
use crate::error::{Result, SessionError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::reducer::{reduce, BlockStore};
use crate::transport::{
    ConnectionId, Inbound, SocketEvent, Transport, TransportEvent, CLOSE_ABNORMAL,
    CLOSE_GOING_AWAY, CLOSE_NORMAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Socket open, access not granted yet
    AwaitingAuth,
    AuthenticatedUnsubscribed,
    Subscribed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingAuth => "awaiting authentication",
            SessionState::AuthenticatedUnsubscribed => "authenticated",
            SessionState::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

pub struct Session<T: Transport> {
    transport: T,
    settings: ConnectionSettings,
    state: SessionState,
    store: BlockStore,
    /// Connection whose events are accepted
    connection: Option<ConnectionId>,
    connection_uri: Option<String>,
    /// Block list named in the last SUBSCRIBE request
    pending_list: Option<String>,
    subscribed_list: Option<String>,
    error: Option<String>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, settings: ConnectionSettings) -> Self {
        Self {
            transport,
            settings,
            state: SessionState::Disconnected,
            store: BlockStore::default(),
            connection: None,
            connection_uri: None,
            pending_list: None,
            subscribed_list: None,
            error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Edit settings for the next `connect()` or `subscribe()`
    pub fn settings_mut(&mut self) -> &mut ConnectionSettings {
        &mut self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Message for the most recent failure, cleared by `connect()`
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn connection_uri(&self) -> Option<&str> {
        self.connection_uri.as_deref()
    }

    pub fn subscribed_list(&self) -> Option<&str> {
        self.subscribed_list.as_deref()
    }

    /// Open a new connection using the current settings.
    ///
    /// An existing connection is closed first and its remaining events are
    /// ignored.
    pub fn connect(&mut self) {
        if self.state != SessionState::Disconnected {
            tracing::info!("Dropping current connection before reconnecting");
            self.reset();
        }

        let endpoint = self.settings.endpoint();
        self.error = None;
        self.connection_uri = Some(endpoint.uri());
        self.connection = Some(self.transport.connect(&endpoint));
        self.transition(SessionState::Connecting);
    }

    /// Close the connection. Safe in every state; the state changes when the
    /// close event arrives.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Subscribe to the block list named in the settings (blank = public)
    pub fn subscribe(&mut self) -> Result<()> {
        self.require(SessionState::AuthenticatedUnsubscribed, "subscribe")?;

        let registry_id = self.settings.block_list_id().to_string();
        if uuid::Uuid::parse_str(&registry_id).is_err() {
            return Err(SessionError::InvalidBlockListId { id: registry_id });
        }

        tracing::info!("Subscribing to block list {}", registry_id);
        self.transport.send(&ClientMessage::Subscribe {
            registry_id: registry_id.clone(),
            passphrase: self.settings.block_list_passphrase.clone().unwrap_or_default(),
        });
        self.pending_list = Some(registry_id);
        Ok(())
    }

    /// Point the settings at another block list, then subscribe to it
    pub fn subscribe_to(&mut self, block_list_id: &str, passphrase: Option<String>) -> Result<()> {
        self.require(SessionState::AuthenticatedUnsubscribed, "subscribe")?;
        self.settings.block_list_id = block_list_id.trim().to_string();
        self.settings.block_list_passphrase = passphrase;
        self.subscribe()
    }

    /// Ask the server to end the subscription; confirmed by `UNSUBSCRIBE`
    pub fn unsubscribe(&mut self) -> Result<()> {
        self.require(SessionState::Subscribed, "unsubscribe")?;

        let registry_id = self
            .subscribed_list
            .clone()
            .unwrap_or_else(|| self.settings.block_list_id().to_string());
        self.transport
            .send(&ClientMessage::Unsubscribe { registry_id });
        Ok(())
    }

    /// Block and group commands; only available while subscribed
    pub fn commands(&self) -> Result<CommandFacade<'_, T>> {
        if self.state != SessionState::Subscribed {
            return Err(SessionError::NotSubscribed);
        }
        Ok(CommandFacade::new(&self.transport, &self.store))
    }

    /// Feed one transport event into the state machine.
    ///
    /// Returns the failure the event surfaced, if any. The same message is
    /// kept in [`Session::error`].
    pub fn handle_event(&mut self, event: SocketEvent) -> Result<()> {
        if self.connection != Some(event.connection) {
            tracing::debug!("Ignoring event from replaced connection {}", event.connection);
            return Ok(());
        }

        match event.event {
            TransportEvent::ReadyStateChange(ready_state) => {
                tracing::debug!("Ready state: {}", ready_state);
                Ok(())
            }
            TransportEvent::Open => {
                if self.state == SessionState::Connecting {
                    self.transition(SessionState::AwaitingAuth);
                }
                Ok(())
            }
            TransportEvent::Close { code } => self.handle_close(code),
            TransportEvent::Message(Inbound::Json(value)) => match ServerMessage::decode(value) {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) => {
                    tracing::debug!("Ignoring message of unknown type");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed message: {}", e);
                    Ok(())
                }
            },
            TransportEvent::Message(Inbound::Raw(text)) => {
                tracing::debug!("Ignoring non-JSON frame ({} bytes)", text.len());
                Ok(())
            }
            TransportEvent::Error(description) => {
                // A close event always follows
                tracing::warn!("Socket error: {}", description);
                Ok(())
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Welcome(_) => {
                if self.state == SessionState::AwaitingAuth {
                    let passphrase = self.settings.passphrase.clone().unwrap_or_default();
                    self.transport.send(&ClientMessage::AuthReq { passphrase });
                } else {
                    tracing::warn!("Unexpected WELCOME while {}", self.state);
                }
                Ok(())
            }

            ServerMessage::AuthRes(result) => {
                if self.state != SessionState::AwaitingAuth {
                    tracing::warn!("Unexpected AUTH_RES while {}", self.state);
                    return Ok(());
                }
                if result.authorized {
                    self.settings.clear_passphrase();
                    self.transition(SessionState::AuthenticatedUnsubscribed);
                    Ok(())
                } else {
                    self.fail(SessionError::AuthRejected {
                        message: result.message.unwrap_or_else(|| "not authorized".to_string()),
                    })
                }
            }

            ServerMessage::Subscribe(result) => {
                if self.state != SessionState::AuthenticatedUnsubscribed {
                    tracing::warn!("Unexpected SUBSCRIBE while {}", self.state);
                    return Ok(());
                }
                let pending = self.pending_list.take();
                if result.subscribed {
                    self.settings.clear_secrets();
                    self.subscribed_list = result.registry_id.or(pending);
                    self.transition(SessionState::Subscribed);
                    Ok(())
                } else {
                    self.fail(SessionError::SubscriptionRejected {
                        message: result.message.unwrap_or_else(|| "not subscribed".to_string()),
                    })
                }
            }

            ServerMessage::Unsubscribe(_) => {
                if self.state == SessionState::Subscribed {
                    self.store.clear_subscription();
                    self.subscribed_list = None;
                    self.transition(SessionState::AuthenticatedUnsubscribed);
                }
                Ok(())
            }

            ServerMessage::ServerError(error) => self.fail(SessionError::Server {
                message: error.message,
            }),

            ServerMessage::BlockLists(_) => {
                self.apply(&message);
                Ok(())
            }

            ServerMessage::Blocks(_)
            | ServerMessage::BlockGroups(_)
            | ServerMessage::BlockUpdate(_)
            | ServerMessage::BlockGroupUpdate(_) => {
                if self.state == SessionState::Subscribed {
                    self.apply(&message);
                } else {
                    tracing::debug!("Ignoring block data while {}", self.state);
                }
                Ok(())
            }
        }
    }

    fn handle_close(&mut self, code: u16) -> Result<()> {
        let uri = self.connection_uri.clone().unwrap_or_default();
        tracing::info!("Connection to {} closed with code {}", uri, code);
        self.reset();

        match code {
            CLOSE_NORMAL => Ok(()),
            CLOSE_GOING_AWAY => self.fail(SessionError::ClosedByServer),
            CLOSE_ABNORMAL => self.fail(SessionError::ConnectionFailed { uri }),
            code => self.fail(SessionError::Closed { code }),
        }
    }

    fn apply(&mut self, message: &ServerMessage) {
        let store = std::mem::take(&mut self.store);
        self.store = reduce(store, message);
    }

    /// Back to `Disconnected` with every cache dropped
    fn reset(&mut self) {
        self.store = BlockStore::default();
        self.connection = None;
        self.pending_list = None;
        self.subscribed_list = None;
        self.transition(SessionState::Disconnected);
    }

    fn require(&self, state: SessionState, action: &'static str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!("Session {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, error: SessionError) -> Result<()> {
        tracing::warn!("{}", error);
        self.error = Some(error.to_string());
        Err(error)
    }
}
