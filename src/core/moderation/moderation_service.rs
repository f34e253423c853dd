// Moderation engine - core entry point for incoming messages.
//
// This service handles:
// - Running each message through the configured stateful filters
// - Routing `/admin ...` commands to the banned registry and the filters
// - Deciding who may run admin commands
// - Stopping filter background work on shutdown
//
// NO Discord dependencies here - just pure domain logic.

use super::banned_registry::{BannedRegistry, BANDB_PREFIX, BANNED_NAMESPACE};
use super::command_router::{tokenize, AdminCommandHandler, CommandContext, CommandRouter};
use super::moderation_config::ModerationConfig;
use super::moderation_models::{ChatMessage, ModerationError, ScoringResult};
use super::platform::ChatPlatform;
use super::registry::{BuildContext, Registry};
use super::state_store::StoreProvider;
use super::stateful_filter::{FilterCommands, StatefulFilter};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

pub const ADMIN_COMMAND: &str = "/admin";
pub const HELP_PREFIX: &str = "help";

/// One filter's verdict on a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterVerdict {
    pub filter: String,
    pub result: ScoringResult,
}

#[derive(Debug, Default)]
pub struct ModerationOutcome {
    pub verdicts: Vec<FilterVerdict>,
    /// Filter that ended processing early, if any.
    pub stopped_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub admin_ids: HashSet<i64>,
    /// Empty means every conversation is moderated.
    pub allowed_conversation_ids: HashSet<i64>,
}

pub struct ModerationEngine {
    filters: Vec<Arc<dyn StatefulFilter>>,
    platform: Arc<dyn ChatPlatform>,
    settings: EngineSettings,
    commands: CommandRouter,
}

impl ModerationEngine {
    pub fn new(
        filters: Vec<Arc<dyn StatefulFilter>>,
        banned: Arc<BannedRegistry>,
        platform: Arc<dyn ChatPlatform>,
        settings: EngineSettings,
        help_text: String,
    ) -> Self {
        let mut commands = CommandRouter::new();
        commands.register(BANDB_PREFIX, banned as Arc<dyn AdminCommandHandler>);
        for filter in &filters {
            commands.register(
                filter.name(),
                Arc::new(FilterCommands(Arc::clone(filter))),
            );
        }
        commands.register(HELP_PREFIX, Arc::new(HelpCommand(help_text)));

        Self {
            filters,
            platform,
            settings,
            commands,
        }
    }

    /// Build the engine and all configured filters.
    pub async fn from_config(
        config: &ModerationConfig,
        registry: &Registry,
        platform: Arc<dyn ChatPlatform>,
        stores: Arc<dyn StoreProvider>,
    ) -> Result<Self, ModerationError> {
        config.validate()?;

        let banned = Arc::new(BannedRegistry::new(stores.open(BANNED_NAMESPACE)));
        let ctx = BuildContext {
            platform: Arc::clone(&platform),
            stores,
            banned: Arc::clone(&banned),
        };
        let filters = registry.build_filters(&ctx, config).await?;

        let settings = EngineSettings {
            admin_ids: config.admin_ids.iter().copied().collect(),
            allowed_conversation_ids: config.allowed_conversation_ids.iter().copied().collect(),
        };

        tracing::info!(filters = filters.len(), "Moderation engine ready");
        Ok(Self::new(filters, banned, platform, settings, registry.help()))
    }

    pub fn is_admin_command(text: &str) -> bool {
        text == ADMIN_COMMAND || text.starts_with("/admin ")
    }

    pub fn is_moderated(&self, conversation_id: i64) -> bool {
        self.settings.allowed_conversation_ids.is_empty()
            || self
                .settings
                .allowed_conversation_ids
                .contains(&conversation_id)
    }

    pub fn command_context(
        &self,
        conversation_id: i64,
        message_id: Option<i64>,
        issuer_id: i64,
    ) -> CommandContext {
        CommandContext {
            platform: Arc::clone(&self.platform),
            conversation_id,
            message_id,
            issuer_id,
        }
    }

    /// Entry point for every incoming message.
    pub async fn handle_message(&self, message: &ChatMessage) -> ModerationOutcome {
        if !self.is_moderated(message.conversation_id) {
            tracing::debug!(conversation_id = message.conversation_id, "Conversation not moderated");
            return ModerationOutcome::default();
        }

        if Self::is_admin_command(&message.text) {
            if let Err(e) = self.handle_admin_message(message).await {
                tracing::warn!(user_id = message.sender.id, "Admin command failed: {}", e);
            }
            return ModerationOutcome::default();
        }

        self.score_message(message).await
    }

    /// Run a message through the filters in order.
    ///
    /// Stops after a final filter reaches the ban score, or after any filter
    /// reports an out-of-band result.
    pub async fn score_message(&self, message: &ChatMessage) -> ModerationOutcome {
        let mut outcome = ModerationOutcome::default();

        for filter in &self.filters {
            let result = filter.score(message).await;
            tracing::debug!(
                filter = filter.name(),
                message_id = message.id,
                user_id = message.sender.id,
                score = result.score,
                reason = %result.reason,
                "Filter scored message"
            );

            let stop = (result.is_ban() && filter.is_final()) || result.is_out_of_band();
            outcome.verdicts.push(FilterVerdict {
                filter: filter.name().to_string(),
                result,
            });
            if stop {
                outcome.stopped_by = Some(filter.name().to_string());
                break;
            }
        }

        outcome
    }

    /// Configured admins always pass; everyone else must be an administrator
    /// of the conversation on the platform.
    pub async fn is_authorized(&self, conversation_id: i64, user_id: i64) -> bool {
        if self.settings.admin_ids.contains(&user_id) {
            return true;
        }
        match self.platform.conversation_administrators(conversation_id).await {
            Ok(admins) => admins.iter().any(|admin| admin.id == user_id),
            Err(e) => {
                tracing::warn!(conversation_id, "Could not fetch conversation admins: {}", e);
                false
            }
        }
    }

    /// Handle a `/admin ...` message.
    pub async fn handle_admin_message(&self, message: &ChatMessage) -> Result<(), ModerationError> {
        let user_id = message.sender.id;
        if !self.is_authorized(message.conversation_id, user_id).await {
            tracing::warn!(user_id, conversation_id = message.conversation_id, "Unauthorized admin command");
            return Err(ModerationError::Unauthorized(user_id));
        }

        let tokens: Vec<String> = tokenize(&message.text).into_iter().skip(1).collect();
        let ctx = self.command_context(message.conversation_id, Some(message.id), user_id);
        self.dispatch_admin(&ctx, &tokens).await
    }

    /// Route already-authorized admin tokens.
    pub async fn dispatch_admin(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        tracing::info!(issuer_id = ctx.issuer_id, command = %tokens.join(" "), "Admin command");
        self.commands.dispatch(ctx, tokens).await
    }

    pub async fn shutdown(&self) {
        for filter in &self.filters {
            filter.shutdown().await;
        }
        tracing::info!("Moderation engine stopped");
    }
}

struct HelpCommand(String);

#[async_trait]
impl AdminCommandHandler for HelpCommand {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        _tokens: &[String],
    ) -> Result<(), ModerationError> {
        ctx.reply(&self.0).await
    }
}
