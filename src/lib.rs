//! Keyword Relay Library
//!
//! A Telegram userbot that watches incoming messages for keywords and
//! rotates a saved message through a folder of groups.
//!
//! This crate provides the core functionality for:
//! - Loading configuration from the environment
//! - Connecting to Telegram via `MTProto`
//! - Relaying deduplicated keyword alerts to a target group
//! - Broadcasting the newest saved message with delayed cleanup

pub mod config;
pub mod monitor;
pub mod scheduler;
pub mod telegram;
