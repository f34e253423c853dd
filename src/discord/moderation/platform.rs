// Discord implementation of the core `ChatPlatform` port.
//
// A conversation is a channel. Bans and admin lookups resolve the channel's
// guild first. Every HTTP call is wrapped in a timeout.

use crate::core::moderation::{ChatPlatform, ChatUser, MessageRef, PlatformError};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Guild member page size when looking up administrators.
const MEMBER_PAGE: u64 = 1000;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    timeout: Duration,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    async fn bounded<T, E: std::fmt::Display>(
        &self,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PlatformError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PlatformError::Api(e.to_string())),
            Err(_) => Err(PlatformError::Timeout(self.timeout)),
        }
    }

    async fn guild_of(&self, conversation_id: i64) -> Result<serenity::GuildId, PlatformError> {
        let channel = self
            .bounded(channel_id(conversation_id)?.to_channel(&self.http))
            .await?;
        channel
            .guild()
            .map(|c| c.guild_id)
            .ok_or(PlatformError::UnknownConversation(conversation_id))
    }
}

fn channel_id(conversation_id: i64) -> Result<serenity::ChannelId, PlatformError> {
    u64::try_from(conversation_id)
        .ok()
        .filter(|id| *id != 0)
        .map(serenity::ChannelId::new)
        .ok_or(PlatformError::UnknownConversation(conversation_id))
}

fn snowflake(id: i64) -> Result<u64, PlatformError> {
    u64::try_from(id)
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| PlatformError::Api(format!("invalid Discord id {}", id)))
}

/// Split message ids into valid Discord ids and failure descriptions.
fn message_ids(ids: &[i64]) -> (Vec<serenity::MessageId>, Vec<String>) {
    let mut valid = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();
    for &id in ids {
        match snowflake(id) {
            Ok(raw) => valid.push(serenity::MessageId::new(raw)),
            Err(e) => failures.push(format!("{}: {}", id, e)),
        }
    }
    (valid, failures)
}

fn message_ref(message: &serenity::Message) -> MessageRef {
    MessageRef {
        conversation_id: message.channel_id.get() as i64,
        message_id: message.id.get() as i64,
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn conversation_administrators(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<ChatUser>, PlatformError> {
        let guild_id = self.guild_of(conversation_id).await?;
        let guild = self.bounded(self.http.get_guild(guild_id)).await?;

        let admin_roles: HashSet<serenity::RoleId> = guild
            .roles
            .values()
            .filter(|role| role.permissions.administrator())
            .map(|role| role.id)
            .collect();

        let members = self
            .bounded(self.http.get_guild_members(guild_id, Some(MEMBER_PAGE), None))
            .await?;

        Ok(members
            .into_iter()
            .filter(|m| {
                m.user.id == guild.owner_id || m.roles.iter().any(|r| admin_roles.contains(r))
            })
            .map(|m| ChatUser {
                id: m.user.id.get() as i64,
                username: m.user.name.clone(),
                is_bot: m.user.bot,
            })
            .collect())
    }

    async fn send_message(
        &self,
        conversation_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<MessageRef, PlatformError> {
        let channel = channel_id(conversation_id)?;
        let mut builder = serenity::CreateMessage::new().content(text);
        if let Some(reply_to) = reply_to {
            builder = builder.reference_message((channel, serenity::MessageId::new(snowflake(reply_to)?)));
        }

        let sent = self
            .bounded(channel.send_message(&self.http, builder))
            .await?;
        Ok(message_ref(&sent))
    }

    async fn delete_messages(
        &self,
        conversation_id: i64,
        ids: &[i64],
    ) -> Result<(), PlatformError> {
        let channel = channel_id(conversation_id)?;
        let (valid, mut failures) = message_ids(ids);
        for message_id in valid {
            if let Err(e) = self
                .bounded(channel.delete_message(&self.http, message_id))
                .await
            {
                failures.push(format!("{}: {}", message_id, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PlatformError::Api(format!(
                "failed to delete messages [{}]",
                failures.join(", ")
            )))
        }
    }

    async fn ban_user(
        &self,
        conversation_id: i64,
        user_id: i64,
        revoke_messages: bool,
    ) -> Result<(), PlatformError> {
        let guild_id = self.guild_of(conversation_id).await?;
        let user = serenity::UserId::new(snowflake(user_id)?);
        // Discord can purge up to 7 days of history on ban.
        let delete_message_days = if revoke_messages { 7 } else { 0 };

        self.bounded(guild_id.ban_with_reason(
            &self.http,
            user,
            delete_message_days,
            "anti-spam verdict",
        ))
        .await
    }

    async fn forward_or_copy_message(
        &self,
        from_conversation_id: i64,
        to_conversation_id: i64,
        message_id: i64,
    ) -> Result<MessageRef, PlatformError> {
        let source = channel_id(from_conversation_id)?;
        let original = self
            .bounded(source.message(&self.http, serenity::MessageId::new(snowflake(message_id)?)))
            .await?;

        // Bots cannot forward on Discord, so post a copy with a jump link.
        let text = format!(
            "Message ({}) from user {}:\n{}",
            original.link(),
            original.author.name,
            original.content
        );
        self.send_message(to_conversation_id, None, &text).await
    }
}
