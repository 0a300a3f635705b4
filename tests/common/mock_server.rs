//! Scripted Webstone server on a loopback port
//!
//! Every accepted socket gets a `WELCOME`, then each client frame is decoded,
//! recorded and answered the way a real server would answer it.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use webstone_remote::protocol::{
    AuthResult, BlockGroups, BlockLists, Blocks, SubscribeResult, Unsubscribed, Welcome,
};
use webstone_remote::{Block, BlockGroup, ClientMessage, Endpoint, ServerMessage, PUBLIC_BLOCK_LIST};

pub const SERVER_PASSPHRASE: &str = "redstone";
pub const PRIVATE_LIST: &str = "4f1c2a9e-8d7b-4c3e-9a21-0b5d6e7f8a90";
pub const PRIVATE_LIST_PASSPHRASE: &str = "torch";

/// Instructions for the socket currently being served
enum Control {
    Push(ServerMessage),
    Close(u16),
}

#[derive(Default)]
struct State {
    blocks: Vec<Block>,
    groups: Vec<BlockGroup>,
    control: Option<mpsc::UnboundedSender<Control>>,
}

pub struct MockServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<ClientMessage>,
    state: Arc<Mutex<State>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (received_tx, received) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(State {
            blocks: sample_blocks(),
            groups: sample_groups(),
            control: None,
        }));

        let counter = Arc::clone(&accepted);
        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let (control_tx, control_rx) = mpsc::unbounded_channel();
                shared.lock().control = Some(control_tx);
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&shared),
                    received_tx.clone(),
                    control_rx,
                ));
            }
        });

        Self {
            addr,
            accepted,
            received,
            state,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            hostname: self.addr.ip().to_string(),
            port: self.addr.port(),
            secure: false,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Next client message, waiting up to five seconds
    pub async fn next_received(&mut self) -> ClientMessage {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("server stopped")
    }

    /// Send a message on the most recent socket
    pub fn push(&self, message: ServerMessage) {
        self.control(Control::Push(message));
    }

    /// Close the most recent socket with `code`
    pub fn close(&self, code: u16) {
        self.control(Control::Close(code));
    }

    fn control(&self, control: Control) {
        if let Some(tx) = self.state.lock().control.as_ref() {
            let _ = tx.send(control);
        }
    }
}

pub fn sample_blocks() -> Vec<Block> {
    vec![
        Block {
            block_id: "lamp".to_string(),
            group_id: Some("hall".to_string()),
            name: "Hall lamp".to_string(),
            powered: false,
            power: 0,
        },
        Block {
            block_id: "door".to_string(),
            group_id: Some("hall".to_string()),
            name: "Front door".to_string(),
            powered: true,
            power: 15,
        },
        Block {
            block_id: "gate".to_string(),
            group_id: None,
            name: "Gate".to_string(),
            powered: false,
            power: 0,
        },
    ]
}

pub fn sample_groups() -> Vec<BlockGroup> {
    vec![BlockGroup {
        group_id: "hall".to_string(),
        name: "Hall".to_string(),
        block_ids: vec!["door".to_string(), "lamp".to_string()],
    }]
}

async fn serve(
    stream: TcpStream,
    state: Arc<Mutex<State>>,
    received: mpsc::UnboundedSender<ClientMessage>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    let welcome = ServerMessage::Welcome(Welcome {
        socket_id: Some(uuid::Uuid::new_v4().to_string()),
        expire_time: None,
    });
    if sink.send(text(&welcome)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else {
                    return;
                };
                let body = match frame {
                    Message::Text(body) => body,
                    Message::Close(_) => {
                        // Sends the queued close reply
                        let _ = sink.flush().await;
                        return;
                    }
                    _ => continue,
                };
                let Ok(message) = serde_json::from_str::<ClientMessage>(&body) else {
                    continue;
                };
                let replies = respond(&state, &message);
                let _ = received.send(message);
                for reply in replies {
                    if sink.send(text(&reply)).await.is_err() {
                        return;
                    }
                }
            }
            command = control.recv() => match command {
                Some(Control::Push(message)) => {
                    if sink.send(text(&message)).await.is_err() {
                        return;
                    }
                }
                Some(Control::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    // Drain until the client answers the close
                    while let Some(Ok(frame)) = stream.next().await {
                        if frame.is_close() {
                            break;
                        }
                    }
                    return;
                }
                None => return,
            }
        }
    }
}

fn text(message: &ServerMessage) -> Message {
    Message::Text(message.encode().unwrap())
}

fn respond(state: &Mutex<State>, message: &ClientMessage) -> Vec<ServerMessage> {
    let mut state = state.lock();
    match message {
        ClientMessage::AuthReq { passphrase } if passphrase == SERVER_PASSPHRASE => {
            let mut lists = BTreeMap::new();
            lists.insert(PUBLIC_BLOCK_LIST.to_string(), "Public".to_string());
            lists.insert(PRIVATE_LIST.to_string(), "Base".to_string());
            vec![
                ServerMessage::AuthRes(AuthResult {
                    authorized: true,
                    message: None,
                }),
                ServerMessage::BlockLists(BlockLists { block_lists: lists }),
            ]
        }
        ClientMessage::AuthReq { .. } => vec![ServerMessage::AuthRes(AuthResult {
            authorized: false,
            message: Some("Wrong passphrase".to_string()),
        })],
        ClientMessage::Subscribe {
            registry_id,
            passphrase,
        } => {
            let allowed = registry_id == PUBLIC_BLOCK_LIST
                || (registry_id == PRIVATE_LIST && passphrase == PRIVATE_LIST_PASSPHRASE);
            if !allowed {
                return vec![ServerMessage::Subscribe(SubscribeResult {
                    subscribed: false,
                    message: Some("Invalid block list passphrase".to_string()),
                    registry_id: None,
                })];
            }
            vec![
                ServerMessage::Subscribe(SubscribeResult {
                    subscribed: true,
                    message: None,
                    registry_id: Some(registry_id.clone()),
                }),
                ServerMessage::Blocks(Blocks {
                    blocks: state.blocks.clone(),
                }),
                ServerMessage::BlockGroups(BlockGroups {
                    block_groups: state.groups.clone(),
                }),
            ]
        }
        ClientMessage::Unsubscribe { registry_id } => {
            vec![ServerMessage::Unsubscribe(Unsubscribed {
                registry_id: Some(registry_id.clone()),
            })]
        }
        ClientMessage::BlockState { block_id, powered } => {
            update_block(&mut state, block_id, |block| {
                block.powered = *powered;
                block.power = if *powered { 15 } else { 0 };
            })
        }
        ClientMessage::BlockPower { block_id, power } => {
            update_block(&mut state, block_id, |block| {
                block.power = *power;
                block.powered = *power > 0;
            })
        }
        ClientMessage::RenameBlock { block_id, name } => {
            update_block(&mut state, block_id, |block| block.name = name.clone())
        }
        ClientMessage::CreateGroup { name } => {
            let group_index = state.groups.len();
            state.groups.push(BlockGroup {
                group_id: format!("group-{}", group_index),
                name: name.clone(),
                block_ids: Vec::new(),
            });
            vec![ServerMessage::BlockGroups(BlockGroups {
                block_groups: state.groups.clone(),
            })]
        }
        _ => Vec::new(),
    }
}

fn update_block(
    state: &mut State,
    block_id: &str,
    edit: impl FnOnce(&mut Block),
) -> Vec<ServerMessage> {
    match state.blocks.iter_mut().find(|block| block.block_id == block_id) {
        Some(block) => {
            edit(block);
            vec![ServerMessage::BlockUpdate(block.clone())]
        }
        None => Vec::new(),
    }
}
