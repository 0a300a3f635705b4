//! Webstone wire protocol
//!
//! Every frame is a JSON text frame carrying one envelope:
//!
//! ```json
//! // Client -> Server
//! {"type": "AUTH_REQ", "payload": {"passphrase": "..."}}
//! {"type": "BLOCK_POWER", "payload": {"blockId": "...", "power": 7}}
//!
//! // Server -> Client
//! {"type": "WELCOME", "payload": {"socketId": "...", "expireTime": "..."}}
//! {"type": "BLOCK_UPDATE", "payload": {"blockId": "...", "powered": true, ...}}
//! ```
//!
//! Type tags are SCREAMING_SNAKE_CASE, payload fields camelCase. Only the
//! `payload` envelope is spoken; `data` envelopes are not understood.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Id of the block list anyone may subscribe to without a passphrase
pub const PUBLIC_BLOCK_LIST: &str = "00000000-0000-0000-0000-000000000000";

/// Longest block or group name the server keeps
pub const MAX_NAME_LEN: usize = 64;

/// Highest redstone power level
pub const MAX_POWER: u8 = 15;

/// Clamp an arbitrary power value into `0..=15`
pub fn clamp_power(power: i64) -> u8 {
    power.clamp(0, i64::from(MAX_POWER)) as u8
}

fn deserialize_power<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_power(raw))
}

/// A remotely controllable block, as mirrored from the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub powered: bool,
    #[serde(default, deserialize_with = "deserialize_power")]
    pub power: u8,
}

/// Named, ordered collection of block ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroup {
    pub group_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub block_ids: Vec<String>,
}

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Answer to `WELCOME`
    AuthReq { passphrase: String },
    /// Attach the session to a block list
    #[serde(rename_all = "camelCase")]
    Subscribe {
        registry_id: String,
        passphrase: String,
    },
    /// Detach from a block list
    #[serde(rename_all = "camelCase")]
    Unsubscribe { registry_id: String },
    #[serde(rename_all = "camelCase")]
    BlockState { block_id: String, powered: bool },
    #[serde(rename_all = "camelCase")]
    BlockPower { block_id: String, power: u8 },
    #[serde(rename_all = "camelCase")]
    RenameBlock { block_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    UnregisterBlock { block_id: String },
    /// An empty `group_id` removes the block from its group
    #[serde(rename_all = "camelCase")]
    ChangeBlockGroup { block_id: String, group_id: String },
    #[serde(rename_all = "camelCase")]
    ChangeBlockIndex { id: String, new_index: usize },
    CreateGroup { name: String },
    #[serde(rename_all = "camelCase")]
    RenameGroup { group_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    DeleteGroup { group_id: String },
    #[serde(rename_all = "camelCase")]
    ChangeGroupIndex { id: String, new_index: usize },
}

impl ClientMessage {
    /// Wire type tag, for logging
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::AuthReq { .. } => "AUTH_REQ",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::BlockState { .. } => "BLOCK_STATE",
            Self::BlockPower { .. } => "BLOCK_POWER",
            Self::RenameBlock { .. } => "RENAME_BLOCK",
            Self::UnregisterBlock { .. } => "UNREGISTER_BLOCK",
            Self::ChangeBlockGroup { .. } => "CHANGE_BLOCK_GROUP",
            Self::ChangeBlockIndex { .. } => "CHANGE_BLOCK_INDEX",
            Self::CreateGroup { .. } => "CREATE_GROUP",
            Self::RenameGroup { .. } => "RENAME_GROUP",
            Self::DeleteGroup { .. } => "DELETE_GROUP",
            Self::ChangeGroupIndex { .. } => "CHANGE_GROUP_INDEX",
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Untyped envelope, the first decoding stage for inbound frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResult {
    pub subscribed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unsubscribed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLists {
    /// registry id -> display name
    #[serde(default)]
    pub block_lists: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocks {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockGroups {
    #[serde(default)]
    pub block_groups: Vec<BlockGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}

/// Server-to-client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Welcome(Welcome),
    AuthRes(AuthResult),
    Subscribe(SubscribeResult),
    Unsubscribe(Unsubscribed),
    BlockLists(BlockLists),
    Blocks(Blocks),
    BlockGroups(BlockGroups),
    BlockUpdate(Block),
    BlockGroupUpdate(BlockGroup),
    ServerError(ServerError),
}

impl ServerMessage {
    /// Decode an already parsed frame.
    ///
    /// Returns `Ok(None)` for type tags this client does not know; those are
    /// skipped rather than treated as errors.
    pub fn decode(value: serde_json::Value) -> serde_json::Result<Option<Self>> {
        let envelope: Envelope = serde_json::from_value(value)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> serde_json::Result<Option<Self>> {
        let Envelope { kind, payload } = envelope;
        let message = match kind.as_str() {
            "WELCOME" => Self::Welcome(lenient(payload)),
            "AUTH_RES" => Self::AuthRes(serde_json::from_value(payload)?),
            "SUBSCRIBE" => Self::Subscribe(serde_json::from_value(payload)?),
            "UNSUBSCRIBE" => Self::Unsubscribe(lenient(payload)),
            "BLOCK_LISTS" => Self::BlockLists(serde_json::from_value(payload)?),
            "BLOCKS" => Self::Blocks(serde_json::from_value(payload)?),
            "BLOCK_GROUPS" => Self::BlockGroups(serde_json::from_value(payload)?),
            "BLOCK_UPDATE" => Self::BlockUpdate(serde_json::from_value(payload)?),
            "BLOCK_GROUP_UPDATE" => Self::BlockGroupUpdate(serde_json::from_value(payload)?),
            "SERVER_ERROR" => Self::ServerError(lenient(payload)),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// Payloads that carry nothing the client acts on may be absent or odd-shaped.
fn lenient<T: DeserializeOwned + Default>(payload: serde_json::Value) -> T {
    serde_json::from_value(payload).unwrap_or_default()
}
