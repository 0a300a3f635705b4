//! Connection settings and the optional config file.
//!
//! The config file lives at:
//! - Linux: ~/.config/webstone-remote/config.toml
//! - macOS: ~/Library/Application Support/webstone-remote/config.toml
//! - Windows: %APPDATA%\webstone-remote\config.toml
//!
//! It only supplies defaults. Passphrases are never read from or written to it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::PUBLIC_BLOCK_LIST;

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4321;

/// Where a socket connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub hostname: String,
    pub port: u16,
    pub secure: bool,
}

impl Endpoint {
    /// `ws://host:port`, or `wss://` for secure sockets
    pub fn uri(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.hostname, self.port)
    }
}

/// Settings for one session, owned by the application root and handed to
/// the [`Session`](crate::session::Session) that uses them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Blank falls back to [`DEFAULT_HOSTNAME`]
    pub hostname: String,
    pub port: Option<u16>,
    /// Sent in `AUTH_REQ`; cleared once the server accepts it
    pub passphrase: Option<String>,
    pub use_secure_socket: bool,
    /// Blank means the public block list
    pub block_list_id: String,
    /// Sent in `SUBSCRIBE`; cleared once the subscription succeeds
    pub block_list_passphrase: Option<String>,
}

impl ConnectionSettings {
    pub fn endpoint(&self) -> Endpoint {
        let hostname = self.hostname.trim();
        Endpoint {
            hostname: if hostname.is_empty() {
                DEFAULT_HOSTNAME.to_string()
            } else {
                hostname.to_string()
            },
            port: self.port.unwrap_or(DEFAULT_PORT),
            secure: self.use_secure_socket,
        }
    }

    pub fn block_list_id(&self) -> &str {
        let id = self.block_list_id.trim();
        if id.is_empty() {
            PUBLIC_BLOCK_LIST
        } else {
            id
        }
    }

    pub fn clear_passphrase(&mut self) {
        self.passphrase = None;
    }

    pub fn clear_secrets(&mut self) {
        self.passphrase = None;
        self.block_list_passphrase = None;
    }
}

// Passphrases stay out of logs.
impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("ConnectionSettings")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("passphrase", &redact(&self.passphrase))
            .field("use_secure_socket", &self.use_secure_socket)
            .field("block_list_id", &self.block_list_id)
            .field("block_list_passphrase", &redact(&self.block_list_passphrase))
            .finish()
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[connection]` table
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub block_list: Option<String>,
}

/// `[logging]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RemoteConfig {
    /// Platform config path, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("webstone-remote").join("config.toml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Settings seeded from the file; secrets always start empty
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            hostname: self.connection.hostname.clone().unwrap_or_default(),
            port: self.connection.port,
            passphrase: None,
            use_secure_socket: self.connection.secure,
            block_list_id: self.connection.block_list.clone().unwrap_or_default(),
            block_list_passphrase: None,
        }
    }
}
