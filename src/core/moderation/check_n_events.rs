// checkNevents - tracks each new user's first N messages.
//
// While a user is unverified every message is tracked and scored. A ban
// verdict bans the user, runs the actions over all tracked messages and
// forgets the user. After N clean messages the user is verified and no
// longer scored by this filter.

use super::action_pipeline::{ActionContext, ActionPipeline, ActionTarget};
use super::banned_registry::{BannedRegistry, BANDB_PREFIX};
use super::command_router::{AdminCommandHandler, CommandContext, CommandRouter};
use super::moderation_config::StatefulFilterConfig;
use super::moderation_models::{ChatMessage, ModerationError, ScoringResult, UserTrackingState};
use super::registry::BuildContext;
use super::scoring_chain::ScoringChain;
use super::state_store::{id_to_key, load_json, save_json, KvStore};
use super::stateful_filter::StatefulFilter;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub const USER_PREFIX: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckNEventsSettings {
    /// Clean messages needed before a user is verified.
    pub threshold: usize,
    pub is_final: bool,
    /// Score messages from users already in the banned registry as bans.
    pub warn_about_already_banned: bool,
}

pub struct CheckNEventsFilter {
    name: String,
    settings: CheckNEventsSettings,
    store: Arc<dyn KvStore>,
    banned: Arc<BannedRegistry>,
    chain: ScoringChain,
    pipeline: ActionPipeline,
    commands: CommandRouter,
}

impl CheckNEventsFilter {
    pub const KIND: &'static str = "checkNevents";
    pub const HELP: &'static str =
        "Scores a user's first n messages and bans on a verdict of 100. Arguments: n (required), isFinal, warnAboutAlreadyBanned (default false)";

    pub fn new(
        name: &str,
        settings: CheckNEventsSettings,
        store: Arc<dyn KvStore>,
        banned: Arc<BannedRegistry>,
        chain: ScoringChain,
        pipeline: ActionPipeline,
    ) -> Self {
        let mut commands = CommandRouter::new();
        for rule in chain.rules() {
            if let Some((prefix, handler)) = rule.admin_commands() {
                commands.register(&prefix, handler);
            }
        }
        commands.register(BANDB_PREFIX, Arc::clone(&banned) as Arc<dyn AdminCommandHandler>);
        commands.register(
            USER_PREFIX,
            Arc::new(UserStateCommands {
                store: Arc::clone(&store),
            }),
        );

        Self {
            name: name.to_string(),
            settings,
            store,
            banned,
            chain,
            pipeline,
            commands,
        }
    }

    pub fn from_config(
        ctx: &BuildContext,
        config: &StatefulFilterConfig,
        chain: ScoringChain,
        pipeline: ActionPipeline,
    ) -> Result<Self, ModerationError> {
        let args = &config.arguments;
        if !args.contains("n") {
            return Err(ModerationError::ConfigError(
                "'n' argument must be specified".to_string(),
            ));
        }
        let settings = CheckNEventsSettings {
            threshold: args.get_positive_or("n", 1)?,
            is_final: args.is_final()?,
            warn_about_already_banned: args.get_bool_or("warnAboutAlreadyBanned", false)?,
        };
        let store = ctx.stores.open(&format!("{}_state", config.name));

        Ok(Self::new(
            &config.name,
            settings,
            store,
            Arc::clone(&ctx.banned),
            chain,
            pipeline,
        ))
    }

    /// Stored record for a user, if any.
    pub async fn tracking_state(
        &self,
        user_id: i64,
    ) -> Result<Option<UserTrackingState>, ModerationError> {
        load_json(self.store.as_ref(), &id_to_key(user_id)).await
    }

    /// Unreadable or missing records start over as a fresh record.
    async fn load_or_fresh(&self, user_id: i64) -> UserTrackingState {
        match self.tracking_state(user_id).await {
            Ok(Some(state)) => state,
            Ok(None) => UserTrackingState::fresh(),
            Err(e) => {
                tracing::warn!(filter = %self.name, user_id, "Tracking state unreadable, starting fresh: {}", e);
                UserTrackingState::fresh()
            }
        }
    }

    async fn run_actions(&self, score: &ScoringResult, message: &ChatMessage, message_ids: &[i64]) {
        let ctx = ActionContext {
            score,
            vacations: None,
        };
        let report = self
            .pipeline
            .run(
                &ctx,
                ActionTarget {
                    message,
                    message_ids,
                    user_id: message.sender.id,
                },
            )
            .await;
        if !report.is_clean() {
            tracing::warn!(
                filter = %self.name,
                user_id = message.sender.id,
                failed = report.failed.len(),
                "Some moderation actions failed"
            );
        }
    }
}

#[async_trait]
impl StatefulFilter for CheckNEventsFilter {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        let user_id = message.sender.id;

        if self.settings.warn_about_already_banned && self.banned.is_banned(user_id).await {
            tracing::warn!(filter = %self.name, user_id, "Message from already banned user");
            let score = ScoringResult::ban("user was already banned");
            self.run_actions(&score, message, &[message.id]).await;
            return score;
        }

        let mut state = self.load_or_fresh(user_id).await;
        if state.verified {
            return ScoringResult::pass();
        }

        state.tracked_message_ids.insert(message.id);
        state.last_update = Utc::now();

        let score = self.chain.score(message).await;

        if score.is_ban() {
            tracing::info!(filter = %self.name, user_id, reason = %score.reason, "Ban verdict reached");
            if let Err(e) = self.banned.ban(user_id).await {
                tracing::error!(filter = %self.name, user_id, "Failed to record ban: {}", e);
            }
            let ids: Vec<i64> = state.tracked_message_ids.iter().copied().collect();
            self.run_actions(&score, message, &ids).await;
            if let Err(e) = self.remove_state(user_id).await {
                tracing::error!(filter = %self.name, user_id, "Failed to drop tracking state: {}", e);
            }
            return score;
        }

        if state.tracked_count() >= self.settings.threshold {
            tracing::debug!(filter = %self.name, user_id, "User verified");
            state.verified = true;
            state.tracked_message_ids.clear();
        }

        if let Err(e) = save_json(self.store.as_ref(), &id_to_key(user_id), &state).await {
            tracing::error!(filter = %self.name, user_id, "Failed to save tracking state: {}", e);
        }

        score
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.settings.is_final
    }

    async fn load_state(&self) -> Result<(), ModerationError> {
        self.chain.load_state().await
    }

    async fn remove_state(&self, key: i64) -> Result<(), ModerationError> {
        self.store.delete(&id_to_key(key)).await
    }

    async fn handle_admin_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        self.commands.dispatch(ctx, tokens).await
    }
}

// ============================================================================
// USER STATE COMMANDS
// ============================================================================

struct UserStateCommands {
    store: Arc<dyn KvStore>,
}

#[async_trait]
impl AdminCommandHandler for UserStateCommands {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        let (Some(command), Some(raw_id)) = (tokens.first(), tokens.get(1)) else {
            ctx.notify("Usage: user <show|verify|reset> <user id>").await;
            return Err(ModerationError::InvalidCommand(
                "user command needs a sub-command and a user id".to_string(),
            ));
        };
        let Ok(user_id) = raw_id.parse::<i64>() else {
            ctx.notify(&format!("Invalid user id: {}", raw_id)).await;
            return Err(ModerationError::InvalidUserId(raw_id.clone()));
        };
        let key = id_to_key(user_id);

        let result = match command.to_lowercase().as_str() {
            "show" => load_json::<UserTrackingState>(self.store.as_ref(), &key)
                .await
                .map(|state| match state {
                    Some(state) => format!(
                        "user {}: verified={}, tracked messages={}, last update {}",
                        user_id,
                        state.verified,
                        state.tracked_count(),
                        state.last_update.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => format!("No state for user {}", user_id),
                }),
            "verify" => save_json(self.store.as_ref(), &key, &UserTrackingState::verified_now())
                .await
                .map(|()| format!("User {} marked as verified", user_id)),
            "reset" => self
                .store
                .delete(&key)
                .await
                .map(|()| format!("State for user {} removed", user_id)),
            other => {
                ctx.notify("Usage: user <show|verify|reset> <user id>").await;
                return Err(ModerationError::NotSupported(other.to_string()));
            }
        };

        match result {
            Ok(text) => ctx.reply(&text).await,
            Err(e) => {
                ctx.notify(&format!("user command failed: {}", e)).await;
                Err(e)
            }
        }
    }
}
