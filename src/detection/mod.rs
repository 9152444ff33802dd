//! Interaction tracking and loop/spam detection.
//!
//! This module owns the detection engine:
//! - The per-group, time-windowed event ledger
//! - The loop and spam rules that turn counts into a ban decision
//! - The supervisor that serializes work per group and evicts idle groups
//!
//! Each group is handled by its own worker task, so ledger mutations for a
//! group are strictly ordered while different groups proceed in parallel.

pub mod detector;
pub mod group;
pub mod ledger;
pub mod scope;

use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    base::{
        config::Config,
        types::{AccountId, Event, GroupId, Void},
    },
    interaction::moderation::ModerationExecutor,
};

use group::GroupMonitor;

/// Capacity of each group worker's queue.
const WORKER_QUEUE: usize = 256;

/// The events recorded for one message of a monitored bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub sender: AccountId,
    pub events: Vec<Event>,
    pub observed_at: DateTime<Utc>,
}

/// Live worker queues, plus group state handed back by workers that retired
/// while observations were still queued.
#[derive(Default)]
pub struct WorkerTable {
    queues: HashMap<GroupId, mpsc::Sender<Observation>>,
    parked: HashMap<GroupId, GroupMonitor>,
}

pub type SharedWorkerTable = Arc<Mutex<WorkerTable>>;

/// Supervisor that routes observations to per-group workers.
///
/// Workers are created lazily on a group's first observation and exit on
/// their own after `group_idle_secs` without input.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Deref for Monitor {
    type Target = MonitorInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Inner state of the monitor.
pub struct MonitorInner {
    config: Config,
    moderation: ModerationExecutor,
    workers: SharedWorkerTable,
}

impl Monitor {
    pub fn new(config: Config, moderation: ModerationExecutor) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                moderation,
                workers: SharedWorkerTable::default(),
            }),
        }
    }

    /// Hands an observation to the worker of `group_id`, starting one if needed.
    pub async fn dispatch(&self, group_id: GroupId, observation: Observation) -> Void {
        let mut observation = observation;

        // A worker may retire between lookup and send; the second attempt gets a fresh one.
        for _ in 0..2 {
            let worker = self.worker(group_id);

            match worker.send(observation).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => {
                    observation = returned;
                    self.retire(group_id, &worker);
                }
            }
        }

        Err(anyhow!("No worker available for group {}.", group_id))
    }

    /// Number of groups that currently have a live worker.
    pub fn active_groups(&self) -> usize {
        let mut table = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        table.queues.retain(|_, worker| !worker.is_closed());
        table.queues.len()
    }

    fn worker(&self, group_id: GroupId) -> mpsc::Sender<Observation> {
        let mut table = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(worker) = table.queues.get(&group_id)
            && !worker.is_closed()
        {
            return worker.clone();
        }

        // Reap every retired worker while the lock is held anyway.
        table.queues.retain(|_, worker| !worker.is_closed());

        debug!("Starting worker for group {}.", group_id);

        let (tx, rx) = mpsc::channel(WORKER_QUEUE);
        let monitor = table.parked.remove(&group_id).unwrap_or_else(|| GroupMonitor::new(group_id, &self.config));
        tokio::spawn(group::run_worker(monitor, rx, self.config.group_idle(), self.moderation.clone(), self.workers.clone()));

        table.queues.insert(group_id, tx.clone());
        tx
    }

    fn retire(&self, group_id: GroupId, worker: &mpsc::Sender<Observation>) {
        let mut table = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        if table.queues.get(&group_id).is_some_and(|current| current.same_channel(worker)) {
            table.queues.remove(&group_id);
        }
    }
}
