// Discord layer - commands, event handlers and the platform adapter.

use crate::core::moderation::ModerationEngine;
use std::sync::Arc;

#[path = "moderation/mod.rs"]
pub mod moderation;

/// Shared data available to every command and event handler.
pub struct Data {
    pub engine: Arc<ModerationEngine>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
