//! Event handling and user interactions for bot-loop-guard.
//!
//! This module provides functionality for handling chat events:
//! - Routing inbound group messages to the detector
//! - Applying superuser roster commands
//! - Muting offenders and retracting their messages

pub mod command;
pub mod group_message;
pub mod moderation;
