// Chat platform port - everything the core needs from the messaging service.
//
// The Discord layer implements this on top of serenity; tests use a recording mock.

use super::moderation_models::{ChatUser, MessageRef};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Platform call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Platform API error: {0}")]
    Api(String),

    #[error("Unknown conversation {0}")]
    UnknownConversation(i64),
}

/// Outbound operations on the chat platform.
///
/// Every call is bounded by the implementation's timeout; an elapsed timeout
/// surfaces as `PlatformError::Timeout` instead of blocking the caller.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Administrators of the given conversation.
    async fn conversation_administrators(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<ChatUser>, PlatformError>;

    /// Send a text message, optionally as a reply.
    async fn send_message(
        &self,
        conversation_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<MessageRef, PlatformError>;

    async fn delete_messages(
        &self,
        conversation_id: i64,
        message_ids: &[i64],
    ) -> Result<(), PlatformError>;

    /// Ban a user. `revoke_messages` also removes their message history.
    async fn ban_user(
        &self,
        conversation_id: i64,
        user_id: i64,
        revoke_messages: bool,
    ) -> Result<(), PlatformError>;

    /// Forward a message to another conversation. Platforms without native
    /// forwarding post a copy instead.
    async fn forward_or_copy_message(
        &self,
        from_conversation_id: i64,
        to_conversation_id: i64,
        message_id: i64,
    ) -> Result<MessageRef, PlatformError>;
}

/// Send a notice and only log if it fails.
pub async fn send_notice(
    platform: &dyn ChatPlatform,
    conversation_id: i64,
    reply_to: Option<i64>,
    text: &str,
) {
    if let Err(e) = platform.send_message(conversation_id, reply_to, text).await {
        tracing::warn!(conversation_id, "Failed to send notice: {}", e);
    }
}
