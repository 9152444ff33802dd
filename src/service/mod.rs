//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the bot-loop-guard:
//! - Chat transports (e.g., OneBot v11)
//! - Bot roster storage (e.g., a JSON file)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod registry;
pub mod transport;
