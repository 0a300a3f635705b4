//! webstone-remote console entry point
//!
//! # Usage
//!
//! ```bash
//! webstone-remote --host 192.168.1.20 --port 4321 --passphrase hunter2
//! WEBSTONE_PASSPHRASE=hunter2 webstone-remote --block-list <uuid>
//! ```

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use webstone_remote::console::{self, ConsoleCommand, Outcome};
use webstone_remote::transport::{SocketEvent, TransportClient};
use webstone_remote::{Cli, RemoteConfig, Session, SessionState};

/// How long to wait for the server to acknowledge a close on exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RemoteConfig::load_from(path),
        None => RemoteConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    init_tracing(cli.log_level(&config));

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let directive = format!("webstone_remote={}", level);
    let filter = match directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => {
            eprintln!("Ignoring unknown log level '{}'", level);
            EnvFilter::from_default_env()
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, config: &RemoteConfig) -> anyhow::Result<()> {
    let (transport, mut events) = TransportClient::new();
    let mut session = Session::new(transport, cli.connection_settings(config));

    println!("Connecting to {} (type 'help' for commands)", session.settings().endpoint().uri());
    session.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                on_socket_event(&mut session, event);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if on_input(&mut session, &line) {
                    break;
                }
            }
        }
    }

    shutdown(&mut session, &mut events).await;
    Ok(())
}

fn on_socket_event(session: &mut Session<TransportClient>, event: SocketEvent) {
    let before = session.state();
    if let Err(e) = session.handle_event(event) {
        println!("{}", e);
    }

    let after = session.state();
    if before == after {
        return;
    }
    println!("[{}]", after);

    match after {
        // Authenticated: follow up with the configured block list
        SessionState::AuthenticatedUnsubscribed if before == SessionState::AwaitingAuth => {
            if let Err(e) = session.subscribe() {
                println!("{}", e);
            }
        }
        SessionState::Subscribed => {
            if let Some(list) = session.subscribed_list() {
                println!("Subscribed to block list {}", list);
            }
        }
        _ => {}
    }
}

/// Returns true when the user asked to quit
fn on_input(session: &mut Session<TransportClient>, line: &str) -> bool {
    let command = match ConsoleCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return false,
        Err(e) => {
            println!("{}", e);
            return false;
        }
    };

    match console::execute(session, command) {
        Ok(Outcome::Print(text)) => {
            print!("{}", text);
            false
        }
        Ok(Outcome::Done) => false,
        Ok(Outcome::Quit) => true,
        Err(e) => {
            println!("{}", e);
            false
        }
    }
}

async fn shutdown(
    session: &mut Session<TransportClient>,
    events: &mut mpsc::UnboundedReceiver<SocketEvent>,
) {
    if session.state() == SessionState::Disconnected {
        return;
    }
    session.disconnect();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while session.state() != SessionState::Disconnected {
            let Some(event) = events.recv().await else {
                break;
            };
            let _ = session.handle_event(event);
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!("Server did not acknowledge close within {:?}", SHUTDOWN_GRACE);
    }
}
