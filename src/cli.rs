//! CLI argument definitions using clap
//!
//! Flags override the config file; passphrases can only come from flags or
//! the environment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConnectionSettings, RemoteConfig};

/// Console client for Webstone remote blocks
#[derive(Parser, Debug)]
#[command(name = "webstone-remote")]
#[command(about = "Control Webstone remote blocks over a WebSocket connection")]
#[command(version)]
pub struct Cli {
    /// Server hostname (default 127.0.0.1)
    #[arg(long, env = "WEBSTONE_HOST")]
    pub host: Option<String>,

    /// Server port (default 4321)
    #[arg(short, long, env = "WEBSTONE_PORT")]
    pub port: Option<u16>,

    /// Connect with wss:// instead of ws://
    #[arg(long)]
    pub secure: bool,

    /// Server passphrase sent during authentication
    #[arg(long, env = "WEBSTONE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Block list to subscribe to after authentication (default: public list)
    #[arg(long)]
    pub block_list: Option<String>,

    /// Passphrase for a private block list
    #[arg(long, env = "WEBSTONE_BLOCK_LIST_PASSPHRASE", hide_env_values = true)]
    pub block_list_passphrase: Option<String>,

    /// Config file to use instead of the platform default
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge flags over the file's connection defaults
    pub fn connection_settings(&self, config: &RemoteConfig) -> ConnectionSettings {
        let mut settings = config.connection_settings();
        if let Some(host) = &self.host {
            settings.hostname = host.clone();
        }
        if self.port.is_some() {
            settings.port = self.port;
        }
        settings.use_secure_socket |= self.secure;
        settings.passphrase = self.passphrase.clone();
        if let Some(block_list) = &self.block_list {
            settings.block_list_id = block_list.clone();
        }
        settings.block_list_passphrase = self.block_list_passphrase.clone();
        settings
    }

    /// Tracing level for this crate
    pub fn log_level<'a>(&self, config: &'a RemoteConfig) -> &'a str {
        if self.verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        }
    }
}
