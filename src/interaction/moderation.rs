//! Moderation actions that follow a positive detection.

use std::time::Duration;

use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        notices,
        types::{Ban, GroupId, MessageId},
    },
    service::transport::TransportClient,
};

/// What a moderation run achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationReport {
    /// Whether the offender was muted.
    pub muted: bool,
    /// Messages retracted, in order.
    pub retracted: Vec<MessageId>,
    /// Messages whose retraction failed, in order.
    pub failed: Vec<MessageId>,
}

/// Mutes offenders and retracts their messages.
///
/// Decisions are not deduplicated here; the group worker's cooldown keeps
/// one burst from producing overlapping bans.
#[derive(Clone)]
pub struct ModerationExecutor {
    transport: TransportClient,
    ban_duration_secs: u64,
    detection_window_secs: u64,
    retract_delay: Duration,
}

impl ModerationExecutor {
    pub fn new(config: &Config, transport: TransportClient) -> Self {
        Self {
            transport,
            ban_duration_secs: config.ban_duration_secs,
            detection_window_secs: config.detection_window_secs,
            retract_delay: config.retract_delay(),
        }
    }

    /// Runs the moderation sequence for `ban` on its own task.
    #[instrument(skip_all)]
    pub fn spawn(&self, ban: Ban) {
        let executor = self.clone();

        tokio::spawn(async move {
            let report = executor.execute(&ban).in_current_span().await;

            info!(
                "Moderation of bot {} in group {} finished: muted = {}, retracted = {}, failed = {}",
                ban.offender,
                ban.group_id,
                report.muted,
                report.retracted.len(),
                report.failed.len()
            );
        });
    }

    /// Mutes the offender, announces it, then retracts the counted messages.
    ///
    /// If the mute fails nothing is retracted and a permission notice is sent
    /// instead. A failed retraction is logged and skipped.
    #[instrument(skip_all, fields(group_id = ban.group_id, offender = ban.offender))]
    pub async fn execute(&self, ban: &Ban) -> ModerationReport {
        let mut report = ModerationReport::default();

        if let Err(err) = self.transport.mute(ban.group_id, ban.offender, self.ban_duration_secs).await {
            error!("Failed to mute bot {} in group {}: {}", ban.offender, ban.group_id, err);
            self.notify(ban.group_id, &notices::ban_failed_notice(ban.offender)).await;
            return report;
        }

        report.muted = true;

        let notice = notices::ban_notice(ban.offender, ban.reason, ban.count, self.detection_window_secs, self.ban_duration_secs);
        self.notify(ban.group_id, &notice).await;

        for (i, message_id) in ban.messages_to_retract.iter().copied().enumerate() {
            if i > 0 && !self.retract_delay.is_zero() {
                tokio::time::sleep(self.retract_delay).await;
            }

            match self.transport.retract_message(message_id).await {
                Ok(()) => report.retracted.push(message_id),
                Err(err) => {
                    warn!("Failed to retract message {}: {}", message_id, err);
                    report.failed.push(message_id);
                }
            }
        }

        report
    }

    async fn notify(&self, group_id: GroupId, text: &str) {
        if let Err(err) = self.transport.notify(group_id, text).await {
            warn!("Failed to notify group {}: {}", group_id, err);
        }
    }
}
