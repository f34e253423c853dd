// Discord adapters for the moderation engine.

pub mod commands;
pub mod platform;
pub mod spam_handler;
