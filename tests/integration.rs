#![cfg(test)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bot_loop_guard::{
    base::{
        config::{Config, ConfigInner},
        notices,
        types::{AccountId, Ban, BanReason, GroupId, GroupMessage, MessageId, Void},
    },
    interaction::{group_message::handle_group_message, moderation::ModerationExecutor},
    runtime::Runtime,
    service::{
        registry::BotRegistry,
        transport::{GenericTransportClient, TransportClient},
    },
};
use chrono::{DateTime, Utc};
use mockall::mock;
use tokio::sync::mpsc;

// Mocks.

// Mock transport client for testing.

mock! {
    pub Transport {}

    #[async_trait]
    impl GenericTransportClient for Transport {
        async fn start(&self, sink: mpsc::Sender<GroupMessage>) -> Void;
        async fn mute(&self, group_id: GroupId, account_id: AccountId, duration_secs: u64) -> Void;
        async fn retract_message(&self, message_id: MessageId) -> Void;
        async fn notify(&self, group_id: GroupId, text: &str) -> Void;
    }
}

/// A call recorded by the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Mute(GroupId, AccountId, u64),
    Retract(MessageId),
    Notify(GroupId, String),
}

type Calls = Arc<Mutex<Vec<Call>>>;

/// Builds a mock transport that records every call.
///
/// Muting fails when `mute_ok` is false; retracting any id in `failing` fails.
fn get_mock_transport(calls: Calls, mute_ok: bool, failing: Vec<MessageId>) -> MockTransport {
    let mut mock = MockTransport::new();

    mock.expect_start().returning(|_| Ok(()));

    let mute_calls = calls.clone();
    mock.expect_mute().returning(move |group_id, account_id, duration_secs| {
        mute_calls.lock().unwrap().push(Call::Mute(group_id, account_id, duration_secs));
        if mute_ok { Ok(()) } else { Err(anyhow::anyhow!("insufficient permission")) }
    });

    let retract_calls = calls.clone();
    mock.expect_retract_message().returning(move |message_id| {
        retract_calls.lock().unwrap().push(Call::Retract(message_id));
        if failing.contains(&message_id) { Err(anyhow::anyhow!("message too old")) } else { Ok(()) }
    });

    let notify_calls = calls;
    mock.expect_notify().returning(move |group_id, text| {
        notify_calls.lock().unwrap().push(Call::Notify(group_id, text.to_string()));
        Ok(())
    });

    mock
}

fn test_config(inner: ConfigInner) -> Config {
    Config::from(ConfigInner { retract_delay_ms: 0, ..inner })
}

/// Helper function to setup the test environment.
fn setup_test_environment(inner: ConfigInner, bots: &[AccountId]) -> (Runtime, Calls) {
    let calls = Calls::default();
    let transport = TransportClient::new(Arc::new(get_mock_transport(calls.clone(), true, vec![])));
    let runtime = Runtime::with_clients(test_config(inner), BotRegistry::in_memory(bots.iter().copied()), transport);

    (runtime, calls)
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn group_message(group_id: GroupId, sender: AccountId, message_id: MessageId, secs: i64, text: &str, mentions: &[AccountId]) -> GroupMessage {
    GroupMessage {
        group_id,
        sender,
        message_id,
        text: text.to_string(),
        mentions: mentions.to_vec(),
        reply_to: None,
        received_at: at(secs),
    }
}

/// Waits until at least `count` calls have been recorded.
async fn wait_for_calls(calls: &Calls, count: usize) -> Vec<Call> {
    for _ in 0..200 {
        {
            let recorded = calls.lock().unwrap();
            if recorded.len() >= count {
                return recorded.clone();
            }
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("Timeout waiting for {} transport calls, got {:?}", count, calls.lock().unwrap());
}

fn loop_ban(messages_to_retract: Vec<MessageId>) -> Ban {
    Ban {
        group_id: 100,
        offender: 1,
        reason: BanReason::Loop,
        count: messages_to_retract.len(),
        messages_to_retract,
    }
}

// Moderation.

#[tokio::test]
async fn test_retraction_continues_after_failure() {
    let calls = Calls::default();
    let transport = TransportClient::new(Arc::new(get_mock_transport(calls.clone(), true, vec![2])));
    let executor = ModerationExecutor::new(&test_config(ConfigInner::default()), transport);

    let report = executor.execute(&loop_ban(vec![1, 2, 3])).await;

    assert!(report.muted);
    assert_eq!(report.retracted, vec![1, 3]);
    assert_eq!(report.failed, vec![2]);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            Call::Mute(100, 1, 600),
            Call::Notify(100, notices::ban_notice(1, BanReason::Loop, 3, 30, 600)),
            Call::Retract(1),
            Call::Retract(2),
            Call::Retract(3),
        ]
    );
}

#[tokio::test]
async fn test_mute_failure_skips_retractions() {
    let calls = Calls::default();
    let transport = TransportClient::new(Arc::new(get_mock_transport(calls.clone(), false, vec![])));
    let executor = ModerationExecutor::new(&test_config(ConfigInner::default()), transport);

    let report = executor.execute(&loop_ban(vec![1, 2])).await;

    assert!(!report.muted);
    assert!(report.retracted.is_empty());
    assert_eq!(*calls.lock().unwrap(), vec![Call::Mute(100, 1, 600), Call::Notify(100, notices::ban_failed_notice(1))]);
}

#[tokio::test(start_paused = true)]
async fn test_retractions_are_spaced_by_fixed_delay() {
    let calls = Calls::default();
    let transport = TransportClient::new(Arc::new(get_mock_transport(calls.clone(), true, vec![])));
    let config = Config::from(ConfigInner {
        retract_delay_ms: 500,
        ..Default::default()
    });
    let executor = ModerationExecutor::new(&config, transport);

    let started = tokio::time::Instant::now();
    let report = executor.execute(&loop_ban(vec![1, 2, 3])).await;

    assert_eq!(report.retracted, vec![1, 2, 3]);
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
}

// End to end.

#[tokio::test]
async fn test_mention_loop_mutes_and_retracts() {
    let (runtime, calls) = setup_test_environment(ConfigInner::default(), &[1, 2]);

    handle_group_message(group_message(100, 1, 11, 0, "hi", &[2]), &runtime).await.unwrap();
    handle_group_message(group_message(100, 1, 12, 10, "hi again", &[2]), &runtime).await.unwrap();

    let recorded = wait_for_calls(&calls, 4).await;

    assert_eq!(
        recorded,
        vec![
            Call::Mute(100, 1, 600),
            Call::Notify(100, notices::ban_notice(1, BanReason::Loop, 2, 30, 600)),
            Call::Retract(11),
            Call::Retract(12),
        ]
    );
}

#[tokio::test]
async fn test_plain_flood_is_spam() {
    let (runtime, calls) = setup_test_environment(ConfigInner::default(), &[1]);

    for i in 0..5 {
        handle_group_message(group_message(100, 1, i, i * 4, "buy now", &[]), &runtime).await.unwrap();
    }

    let recorded = wait_for_calls(&calls, 7).await;

    assert_eq!(recorded[0], Call::Mute(100, 1, 600));
    assert_eq!(recorded[1], Call::Notify(100, notices::ban_notice(1, BanReason::Spam, 5, 30, 600)));
    assert_eq!(recorded[2..], [Call::Retract(0), Call::Retract(1), Call::Retract(2), Call::Retract(3), Call::Retract(4)]);
}

#[tokio::test]
async fn test_groups_out_of_scope_are_ignored() {
    let inner = ConfigInner {
        enabled_groups: vec![100],
        ..Default::default()
    };
    let (runtime, calls) = setup_test_environment(inner, &[1, 2]);

    for i in 0..10 {
        handle_group_message(group_message(200, 1, i, i, "hi", &[2]), &runtime).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(runtime.monitor.active_groups(), 0);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unregistered_sender_is_discarded() {
    let (runtime, calls) = setup_test_environment(ConfigInner::default(), &[1, 2]);

    for i in 0..10 {
        handle_group_message(group_message(100, 55, i, i, "hi", &[1, 2]), &runtime).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(runtime.monitor.active_groups(), 0);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_groups_are_tracked_independently() {
    let (runtime, calls) = setup_test_environment(ConfigInner::default(), &[1, 2]);

    handle_group_message(group_message(100, 1, 1, 0, "hi", &[2]), &runtime).await.unwrap();
    handle_group_message(group_message(300, 1, 2, 1, "hi", &[2]), &runtime).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(runtime.monitor.active_groups(), 2);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_superuser_command_updates_roster() {
    let inner = ConfigInner {
        superusers: vec![42],
        ..Default::default()
    };
    let (runtime, calls) = setup_test_environment(inner, &[1]);

    handle_group_message(group_message(100, 42, 1, 0, "/add_bot 9", &[]), &runtime).await.unwrap();

    let recorded = wait_for_calls(&calls, 1).await;

    assert_eq!(recorded, vec![Call::Notify(100, notices::bots_added_notice(&[9]))]);
    assert!(runtime.registry.contains(9));
}

#[tokio::test]
async fn test_commands_from_others_are_ordinary_messages() {
    let (runtime, calls) = setup_test_environment(ConfigInner::default(), &[1]);

    handle_group_message(group_message(100, 7, 1, 0, "/add_bot 9", &[]), &runtime).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!runtime.registry.contains(9));
    assert!(calls.lock().unwrap().is_empty());
}

// Supervisor.

#[tokio::test(start_paused = true)]
async fn test_idle_groups_are_evicted_and_recreated() {
    let (runtime, _calls) = setup_test_environment(ConfigInner::default(), &[1, 2]);

    handle_group_message(group_message(100, 1, 1, 0, "hi", &[2]), &runtime).await.unwrap();
    assert_eq!(runtime.monitor.active_groups(), 1);

    tokio::time::sleep(runtime.config.group_idle() + Duration::from_secs(1)).await;
    assert_eq!(runtime.monitor.active_groups(), 0);

    handle_group_message(group_message(100, 1, 2, 1000, "hi", &[2]), &runtime).await.unwrap();
    assert_eq!(runtime.monitor.active_groups(), 1);
}
