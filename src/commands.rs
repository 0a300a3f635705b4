//! Typed outbound commands
//!
//! Each method validates its arguments, builds one [`ClientMessage`] and hands
//! it to the transport. Nothing is returned: the effect shows up later as a
//! server message folded into the [`BlockStore`].
//!
//! A [`CommandFacade`] is only handed out by a subscribed
//! [`Session`](crate::session::Session).

use crate::protocol::{clamp_power, ClientMessage, MAX_NAME_LEN};
use crate::reducer::BlockStore;
use crate::transport::Transport;

/// Trim a user-supplied name and cut it to [`MAX_NAME_LEN`] characters.
///
/// Returns `None` for names that are empty after trimming.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    Some(truncated.trim_end().to_string())
}

pub struct CommandFacade<'a, T: Transport + ?Sized> {
    transport: &'a T,
    store: &'a BlockStore,
}

impl<'a, T: Transport + ?Sized> CommandFacade<'a, T> {
    pub(crate) fn new(transport: &'a T, store: &'a BlockStore) -> Self {
        Self { transport, store }
    }

    fn send(&self, message: ClientMessage) {
        self.transport.send(&message);
    }

    pub fn set_block_state(&self, block_id: &str, powered: bool) {
        self.send(ClientMessage::BlockState {
            block_id: block_id.to_string(),
            powered,
        });
    }

    /// Power is clamped to `0..=15`; unchanged power is not resent
    pub fn set_block_power(&self, block_id: &str, power: i64) {
        let power = clamp_power(power);
        if self.store.block(block_id).is_some_and(|block| block.power == power) {
            tracing::debug!("Block {} already at power {}", block_id, power);
            return;
        }
        self.send(ClientMessage::BlockPower {
            block_id: block_id.to_string(),
            power,
        });
    }

    pub fn rename_block(&self, block_id: &str, name: &str) {
        let Some(name) = normalize_name(name) else {
            return;
        };
        self.send(ClientMessage::RenameBlock {
            block_id: block_id.to_string(),
            name,
        });
    }

    /// Unregisters the block on the server. Confirmation is the caller's job.
    pub fn delete_block(&self, block_id: &str) {
        self.send(ClientMessage::UnregisterBlock {
            block_id: block_id.to_string(),
        });
    }

    /// An empty `group_id` takes the block out of its group
    pub fn change_block_group(&self, block_id: &str, group_id: &str) {
        self.send(ClientMessage::ChangeBlockGroup {
            block_id: block_id.to_string(),
            group_id: group_id.to_string(),
        });
    }

    pub fn change_block_index(&self, block_id: &str, new_index: usize) {
        self.send(ClientMessage::ChangeBlockIndex {
            id: block_id.to_string(),
            new_index,
        });
    }

    pub fn create_group(&self, name: &str) {
        let Some(name) = normalize_name(name) else {
            return;
        };
        self.send(ClientMessage::CreateGroup { name });
    }

    pub fn rename_group(&self, group_id: &str, name: &str) {
        let Some(name) = normalize_name(name) else {
            return;
        };
        self.send(ClientMessage::RenameGroup {
            group_id: group_id.to_string(),
            name,
        });
    }

    pub fn delete_group(&self, group_id: &str) {
        self.send(ClientMessage::DeleteGroup {
            group_id: group_id.to_string(),
        });
    }

    pub fn change_group_index(&self, group_id: &str, new_index: usize) {
        self.send(ClientMessage::ChangeGroupIndex {
            id: group_id.to_string(),
            new_index,
        });
    }
}
