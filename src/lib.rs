//! Library root for `bot-loop-guard`.
//!
//! Bot-loop-guard watches group chats for automated accounts that have fallen
//! into a feedback cycle or are flooding a channel:
//! - Detect bots mentioning or replying to each other in a loop
//! - Detect a single bot sending too many messages in a short window
//! - Temporarily mute the offender and retract the offending messages
//!
//! The guard integrates with OneBot v11 implementations for chat, and keeps
//! its roster of monitored bots in a JSON file. The architecture is built
//! around extensible traits that allow for different implementations of each
//! service.

pub mod base;
pub mod detection;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the bot-loop-guard runtime:
/// - Loads the bot roster and creates the transport client
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting bot-loop-guard ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config)?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
