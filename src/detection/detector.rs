//! Loop and spam detection rules.
//!
//! Every evaluation is derived from the ledger alone: there is no per-pair
//! state. Loop detection is checked before spam detection, so a sender that
//! satisfies both is always banned for looping.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::base::{
    config::ConfigInner,
    types::{AccountId, Ban, BanReason, Decision, Event, GroupId, GroupMessage, MessageId},
};

use super::ledger::GroupLedger;

/// Detection thresholds; windows and thresholds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub detection_window: TimeDelta,
    pub interaction_threshold: usize,
    pub spam_threshold: usize,
}

impl From<&ConfigInner> for Thresholds {
    fn from(config: &ConfigInner) -> Self {
        Self {
            detection_window: config.detection_window(),
            interaction_threshold: config.interaction_threshold,
            spam_threshold: config.spam_threshold,
        }
    }
}

/// Collects the registered bots a message addresses.
///
/// The reply target comes first, then mentions in message order. The sender
/// itself and duplicates are skipped.
pub fn classify_targets<F>(message: &GroupMessage, is_bot: F) -> Vec<AccountId>
where
    F: Fn(AccountId) -> bool,
{
    let mut targets = Vec::new();

    for candidate in message.reply_to.into_iter().chain(message.mentions.iter().copied()) {
        if candidate != message.sender && !targets.contains(&candidate) && is_bot(candidate) {
            targets.push(candidate);
        }
    }

    targets
}

/// Builds the events recorded for one message: one per target, or a single untargeted event.
pub fn build_events(message: &GroupMessage, targets: &[AccountId]) -> Vec<Event> {
    let event = |target| Event {
        sender: message.sender,
        target,
        timestamp: message.received_at,
        message_id: message.message_id,
    };

    if targets.is_empty() {
        vec![event(None)]
    } else {
        targets.iter().map(|target| event(Some(*target))).collect()
    }
}

/// Evaluates the loop and spam rules against a group ledger.
#[derive(Debug, Clone, Copy)]
pub struct LoopSpamDetector {
    thresholds: Thresholds,
}

impl LoopSpamDetector {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Records the events of one message from `sender`, prunes the ledger, and evaluates the rules.
    pub fn observe(&self, ledger: &mut GroupLedger, group_id: GroupId, sender: AccountId, events: Vec<Event>, now: DateTime<Utc>) -> Decision {
        for event in events {
            if let Some(target) = event.target {
                debug!("Bot interaction: {} -> {} in group {}", event.sender, target, group_id);
            }

            ledger.append(event);
        }

        ledger.prune_expired(now);

        self.evaluate(ledger, group_id, sender, now)
    }

    /// Evaluates the rules for `sender` without recording anything.
    pub fn evaluate(&self, ledger: &GroupLedger, group_id: GroupId, sender: AccountId, now: DateTime<Utc>) -> Decision {
        let window = self.thresholds.detection_window;

        let interactions = ledger.query_window(now, window, |e| e.sender == sender && e.target.is_some());

        if interactions.len() >= self.thresholds.interaction_threshold {
            warn!("Loop detected for bot {} in group {}, interactions: {}", sender, group_id, interactions.len());
            return ban(group_id, sender, BanReason::Loop, &interactions);
        }

        let messages = ledger.query_window(now, window, |e| e.sender == sender);

        if messages.len() >= self.thresholds.spam_threshold {
            warn!("Spam detected for bot {} in group {}, messages: {}", sender, group_id, messages.len());
            return ban(group_id, sender, BanReason::Spam, &messages);
        }

        Decision::NoAction
    }
}

fn ban(group_id: GroupId, offender: AccountId, reason: BanReason, counted: &[&Event]) -> Decision {
    let mut messages_to_retract: Vec<MessageId> = Vec::with_capacity(counted.len());

    for event in counted {
        if !messages_to_retract.contains(&event.message_id) {
            messages_to_retract.push(event.message_id);
        }
    }

    Decision::Ban(Ban {
        group_id,
        offender,
        reason,
        count: counted.len(),
        messages_to_retract,
    })
}

// Tests.
