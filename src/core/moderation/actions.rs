// Built-in moderation actions.
//
// - deleteAndBan: delete the tracked messages and ban the sender (bulk)
// - forwardToChat: forward the message to a review conversation (per message)
// - addReportButton: ping the conversation's admins about a message (per message)

use super::action_pipeline::{Action, ActionContext};
use super::moderation_config::ActionConfig;
use super::moderation_models::{ChatMessage, ModerationError};
use super::platform::ChatPlatform;
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// DELETE AND BAN
// ============================================================================

pub struct DeleteAndBan {
    name: String,
    platform: Arc<dyn ChatPlatform>,
    dry_run: bool,
    delete_all: bool,
}

impl DeleteAndBan {
    pub const KIND: &'static str = "deleteAndBan";
    pub const HELP: &'static str =
        "Deletes the offending messages and bans the sender. Arguments: dryRun (default true), deleteAll (default true)";

    pub fn from_config(
        platform: Arc<dyn ChatPlatform>,
        config: &ActionConfig,
    ) -> Result<Self, ModerationError> {
        Ok(Self {
            name: config.display_name().to_string(),
            platform,
            dry_run: config.arguments.get_bool_or("dryRun", true)?,
            delete_all: config.arguments.get_bool_or("deleteAll", true)?,
        })
    }
}

#[async_trait]
impl Action for DeleteAndBan {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn per_message(&self) -> bool {
        false
    }

    async fn apply_to_message(
        &self,
        ctx: &ActionContext<'_>,
        message: &ChatMessage,
    ) -> Result<(), ModerationError> {
        self.apply(ctx, message.conversation_id, &[message.id], message.sender.id)
            .await
    }

    async fn apply(
        &self,
        _ctx: &ActionContext<'_>,
        conversation_id: i64,
        message_ids: &[i64],
        user_id: i64,
    ) -> Result<(), ModerationError> {
        if self.dry_run {
            let text = format!(
                "ban conditions for user with id={} has been met, but dryRun is enabled",
                user_id
            );
            self.platform
                .send_message(conversation_id, message_ids.first().copied(), &text)
                .await
                .map_err(|e| ModerationError::action(&self.name, e))?;
            return Ok(());
        }

        // Ban even if the deletion failed, then report the deletion failure.
        let deleted = if message_ids.is_empty() {
            Ok(())
        } else {
            self.platform
                .delete_messages(conversation_id, message_ids)
                .await
        };
        if let Err(e) = &deleted {
            tracing::warn!(user_id, conversation_id, "Failed to delete messages: {}", e);
        }

        self.platform
            .ban_user(conversation_id, user_id, self.delete_all)
            .await
            .map_err(|e| ModerationError::action(&self.name, e))?;
        tracing::info!(user_id, conversation_id, "User banned");

        deleted.map_err(|e| ModerationError::action(&self.name, e))
    }
}

// ============================================================================
// FORWARD TO CHAT
// ============================================================================

pub struct ForwardToChat {
    name: String,
    platform: Arc<dyn ChatPlatform>,
    target_conversation_id: i64,
}

impl ForwardToChat {
    pub const KIND: &'static str = "forwardToChat";
    pub const HELP: &'static str =
        "Forwards the message to a review conversation with its score. Arguments: forwardToChatID (required)";

    pub fn from_config(
        platform: Arc<dyn ChatPlatform>,
        config: &ActionConfig,
    ) -> Result<Self, ModerationError> {
        let target_conversation_id = config.arguments.get_int("forwardToChatID")?;
        if target_conversation_id == 0 {
            return Err(ModerationError::ConfigError(
                "'forwardToChatID' argument must not be 0".to_string(),
            ));
        }
        Ok(Self {
            name: config.display_name().to_string(),
            platform,
            target_conversation_id,
        })
    }
}

#[async_trait]
impl Action for ForwardToChat {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn per_message(&self) -> bool {
        true
    }

    async fn apply_to_message(
        &self,
        ctx: &ActionContext<'_>,
        message: &ChatMessage,
    ) -> Result<(), ModerationError> {
        let forwarded = self
            .platform
            .forward_or_copy_message(
                message.conversation_id,
                self.target_conversation_id,
                message.id,
            )
            .await
            .map_err(|e| ModerationError::action(&self.name, e))?;

        let mut text = format!(
            "user_id: {}\nmessage_spam_score: {}\n",
            message.sender.id, ctx.score.score
        );
        if let Some(link) = &message.link {
            text.push_str(&format!("message_link: {}\n", link));
        }
        text.push_str(&format!("\nban_reason:\n{}", ctx.score.reason));
        self.platform
            .send_message(
                forwarded.conversation_id,
                Some(forwarded.message_id),
                &text,
            )
            .await
            .map_err(|e| ModerationError::action(&self.name, e))?;
        Ok(())
    }

    async fn apply(
        &self,
        _ctx: &ActionContext<'_>,
        _conversation_id: i64,
        _message_ids: &[i64],
        _user_id: i64,
    ) -> Result<(), ModerationError> {
        Err(ModerationError::NotSupported(format!(
            "{} works on single messages only",
            Self::KIND
        )))
    }
}

// ============================================================================
// ADD REPORT BUTTON
// ============================================================================

pub struct AddReportButton {
    name: String,
    platform: Arc<dyn ChatPlatform>,
    anonymous: bool,
    prefix: String,
}

impl AddReportButton {
    pub const KIND: &'static str = "addReportButton";
    pub const HELP: &'static str =
        "Replies to the message mentioning the conversation's admins. Arguments: msgPrefix, isAnonymousReport (default true)";

    pub fn from_config(
        platform: Arc<dyn ChatPlatform>,
        config: &ActionConfig,
    ) -> Result<Self, ModerationError> {
        Ok(Self {
            name: config.display_name().to_string(),
            platform,
            anonymous: config.arguments.get_bool_or("isAnonymousReport", true)?,
            prefix: config.arguments.get_string_or("msgPrefix", "")?,
        })
    }

    async fn compose(&self, ctx: &ActionContext<'_>, message: &ChatMessage) -> Result<String, ModerationError> {
        let admins = self
            .platform
            .conversation_administrators(message.conversation_id)
            .await
            .map_err(|e| ModerationError::action(&self.name, e))?;

        let mut text = String::new();
        if !self.prefix.is_empty() {
            text.push_str(&self.prefix);
            text.push(' ');
        }
        if self.anonymous {
            text.push_str("Spam or chat rules violation: ");
        } else {
            text.push_str(&format!(
                "Message from @{} was reported as spam or a rules violation: ",
                message.sender.username
            ));
        }

        let mut mentions = Vec::new();
        for admin in admins {
            if admin.is_bot || admin.username.to_lowercase().ends_with("bot") {
                continue;
            }
            if let Some(vacations) = ctx.vacations {
                if vacations.is_on_vacation(&admin.username).await {
                    continue;
                }
            }
            mentions.push(format!("@{}", admin.username));
        }
        text.push_str(&mentions.join(", "));

        Ok(text)
    }
}

#[async_trait]
impl Action for AddReportButton {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn per_message(&self) -> bool {
        true
    }

    async fn apply_to_message(
        &self,
        ctx: &ActionContext<'_>,
        message: &ChatMessage,
    ) -> Result<(), ModerationError> {
        let text = self.compose(ctx, message).await?;
        self.platform
            .send_message(message.conversation_id, Some(message.id), &text)
            .await
            .map_err(|e| ModerationError::action(&self.name, e))?;
        Ok(())
    }

    async fn apply(
        &self,
        _ctx: &ActionContext<'_>,
        _conversation_id: i64,
        _message_ids: &[i64],
        _user_id: i64,
    ) -> Result<(), ModerationError> {
        Err(ModerationError::NotSupported(format!(
            "{} works on single messages only",
            Self::KIND
        )))
    }
}
