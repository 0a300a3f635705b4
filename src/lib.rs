//! webstone-remote: client core for Webstone remote blocks
//!
//! A Webstone server exposes redstone "remote blocks" over a WebSocket. This
//! library speaks that protocol: it opens the socket, authenticates with a
//! server passphrase, subscribes to a block list and keeps a local copy of
//! the list's blocks and groups up to date. Block and group edits are sent
//! as typed commands.
//!
//! # Layers
//!
//! - [`protocol`]: JSON envelopes and message types
//! - [`transport`]: one WebSocket at a time, reporting events on a channel
//! - [`session`]: the connect/auth/subscribe state machine
//! - [`reducer`]: folds server messages into a [`BlockStore`]
//! - [`commands`]: outbound block and group edits
//! - [`console`]: the line-oriented front end used by the binary
//!
//! # Example
//!
//! ```ignore
//! use webstone_remote::{ConnectionSettings, Session, TransportClient};
//!
//! let (transport, mut events) = TransportClient::new();
//! let mut session = Session::new(transport, ConnectionSettings::default());
//! session.connect();
//!
//! while let Some(event) = events.recv().await {
//!     session.handle_event(event)?;
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod protocol;
pub mod reducer;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use cli::Cli;
pub use commands::CommandFacade;
pub use config::{ConnectionSettings, Endpoint, RemoteConfig};
pub use error::{CommandError, ConfigError, Result, SessionError};
pub use protocol::{Block, BlockGroup, ClientMessage, ServerMessage, PUBLIC_BLOCK_LIST};
pub use reducer::{reduce, BlockStore};
pub use session::{Session, SessionState};
pub use transport::{ReadyState, SocketEvent, Transport, TransportClient, TransportEvent};
