//! Runtime services and shared state for the bot-loop-guard.

use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    detection::{Monitor, scope::GroupScope},
    interaction::{self, moderation::ModerationExecutor},
    service::{registry::BotRegistry, transport::TransportClient},
};

/// Capacity of the inbound message queue.
const EVENT_QUEUE: usize = 1024;

/// Runtime service context that can be shared across the application.
///
/// This struct holds the configuration, the bot roster, the transport client,
/// and the detection supervisor. It is designed to be trivially cloneable,
/// allowing it to be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The monitored bots.
    pub registry: BotRegistry,
    /// The monitored groups.
    pub scope: GroupScope,
    /// The transport client instance.
    pub transport: TransportClient,
    /// The per-group detection supervisor.
    pub monitor: Monitor,
}

impl Runtime {
    /// Create a new runtime instance backed by OneBot and the JSON roster.
    #[instrument(skip_all)]
    pub fn new(config: Config) -> Res<Self> {
        // Load the bot roster.
        let registry = BotRegistry::json(&config.bots_path)?;

        // Initialize the transport client.
        let transport = TransportClient::onebot(&config)?;

        Ok(Self::with_clients(config, registry, transport))
    }

    /// Create a runtime instance from existing clients.
    pub fn with_clients(config: Config, registry: BotRegistry, transport: TransportClient) -> Self {
        let scope = GroupScope::new(config.enabled_groups.iter().copied());
        let moderation = ModerationExecutor::new(&config, transport.clone());
        let monitor = Monitor::new(config.clone(), moderation);

        Self {
            config,
            registry,
            scope,
            transport,
            monitor,
        }
    }

    /// Runs the transport listener and handles its messages until shutdown.
    pub async fn start(&self) -> Void {
        let (sink, mut messages) = mpsc::channel(EVENT_QUEUE);

        let transport = self.transport.clone();
        let mut listener = tokio::spawn(async move { transport.start(sink).await });

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(message) = messages.recv() => {
                    if let Err(err) = interaction::group_message::handle_group_message(message, self).await {
                        error!("Error while handling: {}", err);
                    }
                }
                result = &mut listener => {
                    return result?;
                }
                _ = &mut shutdown => {
                    info!("Shutting down ...");
                    return Ok(());
                }
            }
        }
    }
}
