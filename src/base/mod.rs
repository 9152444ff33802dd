//! Core components, types, and utilities for the bot-loop-guard.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - User-visible notice templates.
//! - Common types and result handling.

pub mod config;
pub mod notices;
pub mod types;
