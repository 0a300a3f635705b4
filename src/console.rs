//! Line-oriented console on top of a [`Session`]
//!
//! Each stdin line is parsed into a [`ConsoleCommand`] and executed against
//! the session. Block and group commands go through the session's
//! [`CommandFacade`](crate::commands::CommandFacade), so they fail with
//! "not subscribed" instead of being sent early.

use std::fmt::Write as _;

use crate::error::{CommandError, Result};
use crate::protocol::Block;
use crate::reducer::BlockStore;
use crate::session::Session;
use crate::transport::Transport;

pub const HELP: &str = "\
Commands:
  status                       connection and subscription state
  lists                        block lists offered by the server
  blocks                       blocks, grouped
  groups                       groups and their block order
  connect [PASSPHRASE]         (re)connect, optionally with a new passphrase
  disconnect                   close the connection
  subscribe [ID] [PASSPHRASE]  subscribe to a block list (blank = public)
  unsubscribe                  leave the current block list
  on ID | off ID               switch a block
  power ID LEVEL               set power 0-15
  rename ID NAME               rename a block
  delete ID                    unregister a block
  group ID [GROUP]             move a block into a group (no GROUP = ungroup)
  move ID INDEX                reorder a block
  create-group NAME            create a group
  rename-group ID NAME         rename a group
  delete-group ID              delete a group
  move-group ID INDEX          reorder a group
  help | quit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Status,
    Lists,
    Blocks,
    Groups,
    /// A passphrase replaces the one used for the next `AUTH_REQ`
    Connect { passphrase: Option<String> },
    Disconnect,
    Subscribe {
        block_list: Option<String>,
        passphrase: Option<String>,
    },
    Unsubscribe,
    SetState { block_id: String, powered: bool },
    SetPower { block_id: String, power: i64 },
    RenameBlock { block_id: String, name: String },
    DeleteBlock { block_id: String },
    ChangeGroup { block_id: String, group_id: String },
    MoveBlock { block_id: String, index: usize },
    CreateGroup { name: String },
    RenameGroup { group_id: String, name: String },
    DeleteGroup { group_id: String },
    MoveGroup { group_id: String, index: usize },
    Quit,
}

/// Split off the first word; the rest keeps its inner spacing
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim()),
        None => (input, ""),
    }
}

fn required<'a>(word: &'a str, usage: &'static str) -> std::result::Result<&'a str, CommandError> {
    if word.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(word)
    }
}

impl ConsoleCommand {
    /// Parse one input line; blank lines yield `Ok(None)`
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, CommandError> {
        let (verb, rest) = split_word(line);
        if verb.is_empty() {
            return Ok(None);
        }

        let (first, tail) = split_word(rest);

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "status" => Self::Status,
            "lists" => Self::Lists,
            "blocks" | "ls" => Self::Blocks,
            "groups" => Self::Groups,
            "connect" => Self::Connect {
                passphrase: Some(rest.to_string()).filter(|s| !s.is_empty()),
            },
            "disconnect" => Self::Disconnect,
            "quit" | "exit" => Self::Quit,
            "subscribe" => Self::Subscribe {
                block_list: Some(first.to_string()).filter(|s| !s.is_empty()),
                passphrase: Some(tail.to_string()).filter(|s| !s.is_empty()),
            },
            "unsubscribe" => Self::Unsubscribe,
            "on" | "off" => Self::SetState {
                block_id: required(first, "on|off ID")?.to_string(),
                powered: verb.eq_ignore_ascii_case("on"),
            },
            "power" => {
                const USAGE: &str = "power ID LEVEL";
                let block_id = required(first, USAGE)?.to_string();
                let power = tail.parse().map_err(|_| CommandError::Usage(USAGE))?;
                Self::SetPower { block_id, power }
            }
            "rename" => Self::RenameBlock {
                block_id: required(first, "rename ID NAME")?.to_string(),
                name: tail.to_string(),
            },
            "delete" => Self::DeleteBlock {
                block_id: required(first, "delete ID")?.to_string(),
            },
            "group" => Self::ChangeGroup {
                block_id: required(first, "group ID [GROUP]")?.to_string(),
                group_id: tail.to_string(),
            },
            "move" => {
                const USAGE: &str = "move ID INDEX";
                let block_id = required(first, USAGE)?.to_string();
                let index = tail.parse().map_err(|_| CommandError::Usage(USAGE))?;
                Self::MoveBlock { block_id, index }
            }
            "create-group" => Self::CreateGroup {
                name: rest.to_string(),
            },
            "rename-group" => Self::RenameGroup {
                group_id: required(first, "rename-group ID NAME")?.to_string(),
                name: tail.to_string(),
            },
            "delete-group" => Self::DeleteGroup {
                group_id: required(first, "delete-group ID")?.to_string(),
            },
            "move-group" => {
                const USAGE: &str = "move-group ID INDEX";
                let group_id = required(first, USAGE)?.to_string();
                let index = tail.parse().map_err(|_| CommandError::Usage(USAGE))?;
                Self::MoveGroup { group_id, index }
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

/// What the caller should do after a command ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Print(String),
    Done,
    Quit,
}

pub fn execute<T: Transport>(
    session: &mut Session<T>,
    command: ConsoleCommand,
) -> Result<Outcome> {
    let outcome = match command {
        ConsoleCommand::Help => Outcome::Print(HELP.to_string()),
        ConsoleCommand::Status => Outcome::Print(format_status(session)),
        ConsoleCommand::Lists => {
            Outcome::Print(format_lists(session.store(), session.subscribed_list()))
        }
        ConsoleCommand::Blocks => Outcome::Print(format_blocks(session.store())),
        ConsoleCommand::Groups => Outcome::Print(format_groups(session.store())),
        ConsoleCommand::Connect { passphrase } => {
            if passphrase.is_some() {
                session.settings_mut().passphrase = passphrase;
            }
            session.connect();
            Outcome::Done
        }
        ConsoleCommand::Disconnect => {
            session.disconnect();
            Outcome::Done
        }
        ConsoleCommand::Subscribe {
            block_list,
            passphrase,
        } => {
            session.subscribe_to(block_list.as_deref().unwrap_or_default(), passphrase)?;
            Outcome::Done
        }
        ConsoleCommand::Unsubscribe => {
            session.unsubscribe()?;
            Outcome::Done
        }
        ConsoleCommand::SetState { block_id, powered } => {
            session.commands()?.set_block_state(&block_id, powered);
            Outcome::Done
        }
        ConsoleCommand::SetPower { block_id, power } => {
            session.commands()?.set_block_power(&block_id, power);
            Outcome::Done
        }
        ConsoleCommand::RenameBlock { block_id, name } => {
            session.commands()?.rename_block(&block_id, &name);
            Outcome::Done
        }
        ConsoleCommand::DeleteBlock { block_id } => {
            session.commands()?.delete_block(&block_id);
            Outcome::Done
        }
        ConsoleCommand::ChangeGroup { block_id, group_id } => {
            session.commands()?.change_block_group(&block_id, &group_id);
            Outcome::Done
        }
        ConsoleCommand::MoveBlock { block_id, index } => {
            session.commands()?.change_block_index(&block_id, index);
            Outcome::Done
        }
        ConsoleCommand::CreateGroup { name } => {
            session.commands()?.create_group(&name);
            Outcome::Done
        }
        ConsoleCommand::RenameGroup { group_id, name } => {
            session.commands()?.rename_group(&group_id, &name);
            Outcome::Done
        }
        ConsoleCommand::DeleteGroup { group_id } => {
            session.commands()?.delete_group(&group_id);
            Outcome::Done
        }
        ConsoleCommand::MoveGroup { group_id, index } => {
            session.commands()?.change_group_index(&group_id, index);
            Outcome::Done
        }
        ConsoleCommand::Quit => Outcome::Quit,
    };
    Ok(outcome)
}

pub fn format_status<T: Transport>(session: &Session<T>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "state:      {}", session.state());
    let _ = writeln!(out, "socket:     {}", session.transport().ready_state());
    if let Some(uri) = session.connection_uri() {
        let _ = writeln!(out, "server:     {}", uri);
    }
    if let Some(list) = session.subscribed_list() {
        let _ = writeln!(out, "block list: {}", list);
    }
    if let Some(error) = session.error() {
        let _ = writeln!(out, "error:      {}", error);
    }
    out
}

pub fn format_lists(store: &BlockStore, subscribed: Option<&str>) -> String {
    let Some(lists) = store.block_lists.as_ref() else {
        return "No block lists received yet.\n".to_string();
    };
    if lists.is_empty() {
        return "The server offers no block lists.\n".to_string();
    }
    let mut out = String::new();
    for (id, name) in lists {
        let marker = if Some(id.as_str()) == subscribed { '*' } else { ' ' };
        let _ = writeln!(out, "{} {}  {}", marker, id, name);
    }
    out
}

fn format_block(out: &mut String, indent: &str, block: &Block) {
    let _ = writeln!(
        out,
        "{}[{}] {:>2}  {}  ({})",
        indent,
        if block.powered { "on " } else { "off" },
        block.power,
        block.name,
        block.block_id
    );
}

pub fn format_blocks(store: &BlockStore) -> String {
    let Some(blocks) = store.blocks.as_ref() else {
        return "No blocks received yet.\n".to_string();
    };
    if blocks.is_empty() {
        return "No blocks registered.\n".to_string();
    }

    let mut out = String::new();
    for group in store.groups.iter().flatten() {
        let _ = writeln!(out, "{} ({})", group.name, group.group_id);
        for block in store.blocks_in_group(group) {
            format_block(&mut out, "  ", block);
        }
    }

    let mut ungrouped = store.ungrouped_blocks().peekable();
    if ungrouped.peek().is_some() {
        if store.groups.as_ref().is_some_and(|groups| !groups.is_empty()) {
            let _ = writeln!(out, "Ungrouped");
        }
        for block in ungrouped {
            format_block(&mut out, "  ", block);
        }
    }
    out
}

pub fn format_groups(store: &BlockStore) -> String {
    let Some(groups) = store.groups.as_ref() else {
        return "No groups received yet.\n".to_string();
    };
    if groups.is_empty() {
        return "No groups.\n".to_string();
    }
    let mut out = String::new();
    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({}) - {} block(s)",
            index,
            group.name,
            group.group_id,
            group.block_ids.len()
        );
    }
    out
}
