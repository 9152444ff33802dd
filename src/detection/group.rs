//! Per-group serialized state and its worker task.

use std::{collections::HashMap, sync::PoisonError, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::{
    base::{
        config::ConfigInner,
        types::{AccountId, Decision, GroupId},
    },
    interaction::moderation::ModerationExecutor,
};

use super::{
    Observation, SharedWorkerTable,
    detector::{LoopSpamDetector, Thresholds},
    ledger::GroupLedger,
};

/// Everything the guard knows about one group.
///
/// Owned by exactly one worker task, so it is never mutated concurrently.
#[derive(Debug)]
pub struct GroupMonitor {
    group_id: GroupId,
    ledger: GroupLedger,
    detector: LoopSpamDetector,
    ban_duration: TimeDelta,
    /// Offenders whose observations are ignored until the given instant.
    cooldowns: HashMap<AccountId, DateTime<Utc>>,
}

impl GroupMonitor {
    pub fn new(group_id: GroupId, config: &ConfigInner) -> Self {
        Self {
            group_id,
            ledger: GroupLedger::new(config.history_window(), config.max_group_events),
            detector: LoopSpamDetector::new(Thresholds::from(config)),
            ban_duration: config.ban_duration(),
            cooldowns: HashMap::new(),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn ledger(&self) -> &GroupLedger {
        &self.ledger
    }

    /// Records one observation and evaluates the rules for its sender.
    ///
    /// A sender that was banned by this monitor is ignored for the ban
    /// duration, so one burst never yields overlapping decisions.
    pub fn observe(&mut self, observation: Observation) -> Decision {
        let now = observation.observed_at;

        if let Some(until) = self.cooldowns.get(&observation.sender)
            && now < *until
        {
            debug!("Ignoring bot {} in group {} while it is muted.", observation.sender, self.group_id);
            return Decision::NoAction;
        }

        self.cooldowns.retain(|_, until| *until > now);

        let decision = self.detector.observe(&mut self.ledger, self.group_id, observation.sender, observation.events, now);

        if let Decision::Ban(ban) = &decision {
            let until = now.checked_add_signed(self.ban_duration).unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.cooldowns.insert(ban.offender, until);
        }

        decision
    }
}

/// Runs a group's worker until its queue closes or it stays idle for `idle`.
///
/// On idle exit the queue is closed and drained under the worker table lock.
/// If anything was drained, the group was not idle after all and its state is
/// parked in the table for the next worker; otherwise the state is dropped.
#[instrument(skip_all, fields(group_id = monitor.group_id()))]
pub async fn run_worker(mut monitor: GroupMonitor, mut rx: mpsc::Receiver<Observation>, idle: Duration, moderation: ModerationExecutor, table: SharedWorkerTable) {
    debug!("Group worker started.");

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(observation)) => handle(&mut monitor, observation, &moderation),
            Ok(None) => break,
            Err(_) => {
                retire(monitor, &mut rx, &moderation, &table);
                break;
            }
        }
    }
}

fn retire(mut monitor: GroupMonitor, rx: &mut mpsc::Receiver<Observation>, moderation: &ModerationExecutor, table: &SharedWorkerTable) {
    let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);

    rx.close();

    let mut drained = 0;
    while let Ok(observation) = rx.try_recv() {
        handle(&mut monitor, observation, moderation);
        drained += 1;
    }

    if drained > 0 {
        debug!("Group {} received {} observations while retiring, parking its state.", monitor.group_id(), drained);
        table.parked.insert(monitor.group_id(), monitor);
    } else {
        info!("Group {} idle, dropping {} retained events.", monitor.group_id(), monitor.ledger().len());
    }
}

fn handle(monitor: &mut GroupMonitor, observation: Observation, moderation: &ModerationExecutor) {
    if let Decision::Ban(ban) = monitor.observe(observation) {
        moderation.spawn(ban);
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        base::{
            config::Config,
            types::{BanReason, Event, GroupId, GroupMessage, MessageId, Void},
        },
        service::transport::{GenericTransportClient, TransportClient},
    };

    struct SilentTransport;

    #[async_trait]
    impl GenericTransportClient for SilentTransport {
        async fn start(&self, _sink: mpsc::Sender<GroupMessage>) -> Void {
            Ok(())
        }

        async fn mute(&self, _group_id: GroupId, _account_id: AccountId, _duration_secs: u64) -> Void {
            Ok(())
        }

        async fn retract_message(&self, _message_id: MessageId) -> Void {
            Ok(())
        }

        async fn notify(&self, _group_id: GroupId, _text: &str) -> Void {
            Ok(())
        }
    }

    fn moderation() -> ModerationExecutor {
        ModerationExecutor::new(&Config::from(ConfigInner::default()), TransportClient::new(Arc::new(SilentTransport)))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn mention(sender: AccountId, target: AccountId, secs: i64, message_id: i64) -> Observation {
        Observation {
            sender,
            events: vec![Event {
                sender,
                target: Some(target),
                timestamp: at(secs),
                message_id,
            }],
            observed_at: at(secs),
        }
    }

    fn monitor() -> GroupMonitor {
        GroupMonitor::new(
            100,
            &ConfigInner {
                interaction_threshold: 2,
                ban_duration_secs: 600,
                ..Default::default()
            },
        )
    }

    #[test]
    fn banned_sender_is_ignored_during_cooldown() {
        let mut monitor = monitor();

        assert_eq!(monitor.observe(mention(1, 2, 0, 1)), Decision::NoAction);
        assert!(matches!(monitor.observe(mention(1, 2, 10, 2)), Decision::Ban(_)));

        // The mute may take effect late; the same burst must not be banned twice.
        assert_eq!(monitor.observe(mention(1, 2, 11, 3)), Decision::NoAction);
        assert_eq!(monitor.observe(mention(1, 2, 12, 4)), Decision::NoAction);
        assert_eq!(monitor.ledger().len(), 2);
    }

    #[test]
    fn cooldown_is_per_sender() {
        let mut monitor = monitor();

        monitor.observe(mention(1, 2, 0, 1));
        monitor.observe(mention(1, 2, 1, 2));

        assert_eq!(monitor.observe(mention(2, 1, 2, 3)), Decision::NoAction);
        assert!(matches!(
            monitor.observe(mention(2, 1, 3, 4)),
            Decision::Ban(ban) if ban.offender == 2 && ban.reason == BanReason::Loop
        ));
    }

    #[test]
    fn cooldown_expires_after_ban_duration() {
        let mut monitor = monitor();

        monitor.observe(mention(1, 2, 0, 1));
        assert!(matches!(monitor.observe(mention(1, 2, 1, 2)), Decision::Ban(_)));

        assert_eq!(monitor.observe(mention(1, 2, 601, 3)), Decision::NoAction);
        assert!(matches!(monitor.observe(mention(1, 2, 602, 4)), Decision::Ban(_)));
    }

    #[test]
    fn oversized_ban_duration_saturates_cooldown() {
        let mut monitor = GroupMonitor::new(
            100,
            &ConfigInner {
                interaction_threshold: 1,
                ban_duration_secs: 10_000_000_000_000,
                ..Default::default()
            },
        );

        assert!(matches!(monitor.observe(mention(1, 2, 0, 1)), Decision::Ban(_)));
        assert_eq!(monitor.observe(mention(1, 2, 1, 2)), Decision::NoAction);
    }

    #[tokio::test]
    async fn observations_drained_on_retirement_are_parked() {
        let table = SharedWorkerTable::default();
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(mention(1, 2, 0, 1)).unwrap();

        retire(monitor(), &mut rx, &moderation(), &table);

        assert!(tx.is_closed());
        let mut parked = table.lock().unwrap().parked.remove(&100).unwrap();
        assert_eq!(parked.ledger().len(), 1);

        // The next worker resumes with the drained event already counted.
        assert!(matches!(parked.observe(mention(1, 2, 1, 2)), Decision::Ban(_)));
    }

    #[tokio::test]
    async fn idle_state_is_dropped_on_retirement() {
        let table = SharedWorkerTable::default();
        let (tx, mut rx) = mpsc::channel::<Observation>(4);

        retire(monitor(), &mut rx, &moderation(), &table);

        assert!(tx.is_closed());
        assert!(table.lock().unwrap().parked.is_empty());
    }
}
