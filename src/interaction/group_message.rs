//! Entry point for every inbound group message.

use tracing::{debug, info, instrument};

use crate::{
    base::types::{GroupMessage, Void},
    detection::{
        Observation,
        detector::{build_events, classify_targets},
    },
    interaction::command,
    runtime::Runtime,
};

/// Handles a group message.
///
/// Messages from groups out of scope are dropped first, so those groups never
/// accumulate history. Superuser commands are routed to the command handler;
/// everything else only matters when the sender is a monitored bot.
#[instrument(skip_all, fields(group_id = message.group_id, sender = message.sender))]
pub async fn handle_group_message(message: GroupMessage, runtime: &Runtime) -> Void {
    if !runtime.scope.is_enabled(message.group_id) {
        return Ok(());
    }

    if runtime.config.superusers.contains(&message.sender)
        && let Some(command) = command::parse_command(&runtime.config.command_prefix, &message)
    {
        info!("Handling {:?} from superuser {} ...", command, message.sender);
        command::handle_command(command, message.group_id, runtime.registry.clone(), runtime.transport.clone());
        return Ok(());
    }

    if !runtime.registry.contains(message.sender) {
        return Ok(());
    }

    let targets = classify_targets(&message, |id| runtime.registry.contains(id));
    debug!("Message {} from bot {} addresses {:?}", message.message_id, message.sender, targets);

    let observation = Observation {
        sender: message.sender,
        events: build_events(&message, &targets),
        observed_at: message.received_at,
    };

    runtime.monitor.dispatch(message.group_id, observation).await
}
