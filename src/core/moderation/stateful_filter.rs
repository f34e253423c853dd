// Stateful filter contract - the unit the engine runs messages through.

use super::command_router::{AdminCommandHandler, CommandContext};
use super::moderation_models::{ChatMessage, ModerationError, ScoringResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait StatefulFilter: Send + Sync {
    /// Scoring never fails; storage and platform problems are logged.
    async fn score(&self, message: &ChatMessage) -> ScoringResult;

    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// A final filter that bans stops the engine's filter loop.
    fn is_final(&self) -> bool;

    /// Load persisted rule state. Called once after construction.
    async fn load_state(&self) -> Result<(), ModerationError>;

    /// Forget whatever the filter stored under `key`.
    async fn remove_state(&self, key: i64) -> Result<(), ModerationError>;

    async fn handle_admin_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError>;

    /// Stop background work. Default: nothing to stop.
    async fn shutdown(&self) {}
}

/// Exposes a filter's admin commands under its name in a `CommandRouter`.
pub struct FilterCommands(pub Arc<dyn StatefulFilter>);

#[async_trait]
impl AdminCommandHandler for FilterCommands {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        self.0.handle_admin_command(ctx, tokens).await
    }
}
