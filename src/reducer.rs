//! Folding server messages into the local block cache
//!
//! The cache is read-mostly: it changes only when the server says so. Snapshots
//! replace a collection wholesale; single-entity updates replace the entity
//! with the same id and are dropped when that id is not cached.

use std::collections::BTreeMap;

use crate::protocol::{Block, BlockGroup, ServerMessage};

/// Client-side copy of the server's block state
///
/// `None` collections have not been received yet (or were cleared); they are
/// distinct from an empty snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStore {
    /// registry id -> display name
    pub block_lists: Option<BTreeMap<String, String>>,
    pub blocks: Option<Vec<Block>>,
    pub groups: Option<Vec<BlockGroup>>,
}

impl BlockStore {
    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks
            .as_ref()?
            .iter()
            .find(|block| block.block_id == block_id)
    }

    pub fn group(&self, group_id: &str) -> Option<&BlockGroup> {
        self.groups
            .as_ref()?
            .iter()
            .find(|group| group.group_id == group_id)
    }

    /// Blocks of `group` in the group's order, skipping ids not cached
    pub fn blocks_in_group<'a>(
        &'a self,
        group: &'a BlockGroup,
    ) -> impl Iterator<Item = &'a Block> + 'a {
        group.block_ids.iter().filter_map(move |id| self.block(id))
    }

    /// Blocks that belong to no group
    pub fn ungrouped_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks
            .iter()
            .flatten()
            .filter(|block| block.group_id.as_deref().map_or(true, str::is_empty))
    }

    /// Forget blocks and groups but keep the list of block lists
    pub fn clear_subscription(&mut self) {
        self.blocks = None;
        self.groups = None;
    }
}

/// Apply one server message to the store
///
/// Messages that carry no block state leave the store untouched.
pub fn reduce(mut store: BlockStore, message: &ServerMessage) -> BlockStore {
    match message {
        ServerMessage::BlockLists(lists) => {
            store.block_lists = Some(lists.block_lists.clone());
        }
        ServerMessage::Blocks(snapshot) => {
            store.blocks = Some(snapshot.blocks.clone());
        }
        ServerMessage::BlockGroups(snapshot) => {
            store.groups = Some(snapshot.block_groups.clone());
        }
        ServerMessage::BlockUpdate(update) => {
            if let Some(block) = store
                .blocks
                .iter_mut()
                .flatten()
                .find(|block| block.block_id == update.block_id)
            {
                *block = update.clone();
            }
        }
        ServerMessage::BlockGroupUpdate(update) => {
            if let Some(group) = store
                .groups
                .iter_mut()
                .flatten()
                .find(|group| group.group_id == update.group_id)
            {
                *group = update.clone();
            }
        }
        ServerMessage::Welcome(_)
        | ServerMessage::AuthRes(_)
        | ServerMessage::Subscribe(_)
        | ServerMessage::Unsubscribe(_)
        | ServerMessage::ServerError(_) => {}
    }
    store
}

/// Apply messages in order
pub fn reduce_all<'a, I>(store: BlockStore, messages: I) -> BlockStore
where
    I: IntoIterator<Item = &'a ServerMessage>,
{
    messages.into_iter().fold(store, reduce)
}
