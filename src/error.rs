//! Error types and exit codes for webstone-remote

use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

use crate::session::SessionState;

/// Failures surfaced by the session layer
///
/// None of these are fatal: each one leaves the session in an earlier state
/// (disconnected or unsubscribed) and the message is shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connection to {uri} failed.")]
    ConnectionFailed { uri: String },

    #[error("Connection closed by server.")]
    ClosedByServer,

    #[error("Connection closed unexpectedly (code {code}).")]
    Closed { code: u16 },

    #[error("Authentication failed: {message}")]
    AuthRejected { message: String },

    #[error("Subscription failed: {message}")]
    SubscriptionRejected { message: String },

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("Not subscribed to a block list")]
    NotSubscribed,

    #[error("Invalid block list id: {id}")]
    InvalidBlockListId { id: String },
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    Parse { message: String },
}

impl ConfigError {
    /// Process exit code for the console binary:
    /// - 2: config file unreadable
    /// - 3: config file malformed
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io { .. } => ExitCode::from(2),
            Self::Parse { .. } => ExitCode::from(3),
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Console input that could not be turned into a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}
