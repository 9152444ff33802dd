//! Superuser commands that manage the bot roster.

use tracing::{Instrument, error, instrument};

use crate::{
    base::{
        notices,
        types::{AccountId, GroupId, GroupMessage, Void},
    },
    service::{registry::BotRegistry, transport::TransportClient},
};

/// A roster command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddBot(Vec<AccountId>),
    DelBot(Vec<AccountId>),
    ListBots,
}

/// Parses a roster command from a message, or `None` if it is not one.
///
/// Targets come from the message's mentions; without mentions, numeric
/// arguments are used instead.
pub fn parse_command(prefix: &str, message: &GroupMessage) -> Option<Command> {
    let body = message.text.trim_start().strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?;

    let targets = || {
        let candidates = if message.mentions.is_empty() {
            words.filter_map(|word| word.parse::<AccountId>().ok()).collect::<Vec<_>>()
        } else {
            message.mentions.clone()
        };

        let mut targets = Vec::with_capacity(candidates.len());
        for id in candidates {
            if !targets.contains(&id) {
                targets.push(id);
            }
        }
        targets
    };

    match name {
        "add_bot" => Some(Command::AddBot(targets())),
        "del_bot" => Some(Command::DelBot(targets())),
        "list_bots" => Some(Command::ListBots),
        _ => None,
    }
}

/// Applies a command to the registry and returns the reply text.
pub fn apply_command(command: &Command, registry: &BotRegistry) -> String {
    match command {
        Command::AddBot(ids) | Command::DelBot(ids) if ids.is_empty() => notices::ROSTER_USAGE.to_string(),
        Command::AddBot(ids) => {
            let added = ids.iter().copied().filter(|id| registry.add(*id)).collect::<Vec<_>>();
            notices::bots_added_notice(&added)
        }
        Command::DelBot(ids) => {
            let removed = ids.iter().copied().filter(|id| registry.remove(*id)).collect::<Vec<_>>();
            notices::bots_removed_notice(&removed)
        }
        Command::ListBots => notices::bots_listed_notice(&registry.list()),
    }
}

/// Handles a roster command.
///
/// This function spawns a new task that applies the command and replies in the group.
#[instrument(skip_all)]
pub fn handle_command(command: Command, group_id: GroupId, registry: BotRegistry, transport: TransportClient) {
    tokio::spawn(async move {
        // Process the command.
        let result = handle_command_internal(command, group_id, &registry, &transport).in_current_span().await;

        // Log any errors.
        if let Err(err) = &result {
            error!("Error while handling: {}", err);
        }
    });
}

#[instrument(skip_all)]
async fn handle_command_internal(command: Command, group_id: GroupId, registry: &BotRegistry, transport: &TransportClient) -> Void {
    let reply = apply_command(&command, registry);
    transport.notify(group_id, &reply).await
}

// Tests.
