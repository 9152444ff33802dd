//! Chat transport integration for bot-loop-guard.
//!
//! This module provides functionality for interacting with group chat platforms:
//! - Receiving group messages
//! - Muting members and retracting messages
//! - Posting notices to a group
//!
//! It defines the `GenericTransportClient` trait that can be implemented for different
//! chat protocols, with a default implementation for OneBot v11.

pub mod onebot;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::base::types::{AccountId, GroupId, GroupMessage, MessageId, Void};

// Traits.

/// Generic "transport" trait that clients must implement.
///
/// Every action returns an explicit result; callers decide how a failure is
/// surfaced. None of these calls is retried by the transport.
#[async_trait]
pub trait GenericTransportClient: Send + Sync + 'static {
    /// Start the transport listener.
    ///
    /// Every group message received is pushed into `sink`, in arrival order.
    /// Returns when the listener stops.
    async fn start(&self, sink: mpsc::Sender<GroupMessage>) -> Void;

    /// Mute a member of a group for `duration_secs` seconds.
    async fn mute(&self, group_id: GroupId, account_id: AccountId, duration_secs: u64) -> Void;

    /// Retract (delete) a message.
    async fn retract_message(&self, message_id: MessageId) -> Void;

    /// Post a plain text notice to a group.
    async fn notify(&self, group_id: GroupId, text: &str) -> Void;
}

// Structs.

/// Transport client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<dyn GenericTransportClient>,
}

impl Deref for TransportClient {
    type Target = dyn GenericTransportClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl TransportClient {
    pub fn new(inner: Arc<dyn GenericTransportClient>) -> Self {
        Self { inner }
    }
}
