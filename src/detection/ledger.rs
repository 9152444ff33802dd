//! Per-group, time-windowed interaction history.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use crate::base::types::Event;

/// Arrival-ordered events of one group.
///
/// After `prune_expired(now)`, every retained event satisfies
/// `now - timestamp <= history_window`. The ledger is also capped at
/// `max_events`; the oldest events are dropped first.
#[derive(Debug)]
pub struct GroupLedger {
    events: VecDeque<Event>,
    history_window: TimeDelta,
    max_events: usize,
}

impl GroupLedger {
    pub fn new(history_window: TimeDelta, max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            history_window,
            max_events: max_events.max(1),
        }
    }

    /// Appends an event at the end; arrival order is kept as is.
    pub fn append(&mut self, event: Event) {
        self.events.push_back(event);

        if self.events.len() > self.max_events {
            let overflow = self.events.len() - self.max_events;
            self.events.drain(..overflow);
            warn!("Ledger cap of {} events reached, dropped {} oldest.", self.max_events, overflow);
        }
    }

    /// Removes every event older than the history window; returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.events.len();
        let window = self.history_window;

        self.events.retain(|event| now - event.timestamp <= window);

        before - self.events.len()
    }

    /// Returns, in arrival order, the retained events matching `predicate` that are at most `window` old.
    pub fn query_window<P>(&self, now: DateTime<Utc>, window: TimeDelta, predicate: P) -> Vec<&Event>
    where
        P: Fn(&Event) -> bool,
    {
        self.events.iter().filter(|event| now - event.timestamp <= window && predicate(*event)).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

// Tests.
