// Moderation domain models - data structures shared by the scoring core.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts gateway messages into these before scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::platform::PlatformError;

/// Score that marks a message as ban-worthy.
pub const MAX_SCORE: i32 = 100;

/// Out-of-band outcome: the message was already handled elsewhere.
pub const ALREADY_HANDLED: i32 = -1;

// ============================================================================
// MESSAGES
// ============================================================================

/// Author of a message, as far as the core cares about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatUser {
    pub id: i64,
    pub username: String,
    pub is_bot: bool,
}

/// Structured fragments the platform found in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Url,
    TextLink,
    Mention,
    TextMention,
    Email,
    CustomEmoji,
}

impl EntityKind {
    /// Entities counted by link-style rules.
    pub fn is_link(self) -> bool {
        matches!(
            self,
            EntityKind::Url
                | EntityKind::TextLink
                | EntityKind::Mention
                | EntityKind::TextMention
                | EntityKind::Email
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntity {
    pub kind: EntityKind,
    /// Byte offset into the message text.
    pub offset: usize,
    pub length: usize,
}

/// A chat message handed to the core by the platform adapter.
///
/// The core never mutates it; rules and filters only read from it.
#[derive(Debug, Clone, Default)]
pub struct ChatMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: ChatUser,
    pub text: String,
    pub caption: Option<String>,
    pub entities: Vec<MessageEntity>,
    /// The message this one replies to, if any.
    pub reply_to: Option<Box<ChatMessage>>,
    pub is_forward: bool,
    /// Deep link to the message, when the platform has one.
    pub link: Option<String>,
}

impl ChatMessage {
    pub fn caption(&self) -> &str {
        self.caption.as_deref().unwrap_or("")
    }

    pub fn count_entities(&self, predicate: impl Fn(EntityKind) -> bool) -> usize {
        self.entities.iter().filter(|e| predicate(e.kind)).count()
    }
}

/// Reference to a message the platform created for us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub conversation_id: i64,
    pub message_id: i64,
}

// ============================================================================
// SCORING
// ============================================================================

/// Result of scoring one message with one rule or filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoringResult {
    pub score: i32,
    pub reason: String,
}

impl ScoringResult {
    /// Nothing matched.
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn new(score: i32, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: reason.into(),
        }
    }

    pub fn ban(reason: impl Into<String>) -> Self {
        Self::new(MAX_SCORE, reason)
    }

    pub fn already_handled(reason: impl Into<String>) -> Self {
        Self::new(ALREADY_HANDLED, reason)
    }

    pub fn is_ban(&self) -> bool {
        self.score >= MAX_SCORE
    }

    pub fn is_out_of_band(&self) -> bool {
        self.score < 0
    }
}

// ============================================================================
// PERSISTED STATE
// ============================================================================

/// Per-user record kept by a `checkNevents` filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTrackingState {
    pub verified: bool,
    #[serde(default)]
    pub tracked_message_ids: BTreeSet<i64>,
    pub last_update: DateTime<Utc>,
}

impl UserTrackingState {
    /// Empty record for a user we have not seen (or forgot).
    pub fn fresh() -> Self {
        Self {
            verified: false,
            tracked_message_ids: BTreeSet::new(),
            last_update: Utc::now(),
        }
    }

    pub fn verified_now() -> Self {
        Self {
            verified: true,
            ..Self::fresh()
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked_message_ids.len()
    }
}

/// Per-reported-message record kept by the report filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportState {
    /// `true` once the report was acted on.
    pub verified: bool,
    pub last_update: DateTime<Utc>,
}

impl ReportState {
    pub fn fresh() -> Self {
        Self {
            verified: false,
            last_update: Utc::now(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Action `{action}` failed: {reason}")]
    ActionError { action: String, reason: String },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Command not supported: {0}")]
    NotSupported(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid key")]
    InvalidKey,

    #[error("User {0} is not allowed to run admin commands")]
    Unauthorized(i64),
}

impl ModerationError {
    pub fn action(action: &str, reason: impl ToString) -> Self {
        ModerationError::ActionError {
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_result_classification() {
        assert!(ScoringResult::ban("x").is_ban());
        assert!(!ScoringResult::pass().is_ban());
        assert!(ScoringResult::already_handled("dup").is_out_of_band());
        assert!(!ScoringResult::new(50, "half").is_out_of_band());
    }

    #[test]
    fn test_tracking_state_tolerates_missing_ids() {
        let json = r#"{"verified":true,"last_update":"2024-05-01T10:00:00Z"}"#;
        let state: UserTrackingState = serde_json::from_str(json).unwrap();
        assert!(state.verified);
        assert_eq!(state.tracked_count(), 0);
    }

    #[test]
    fn test_entity_kinds_counted_as_links() {
        assert!(EntityKind::Email.is_link());
        assert!(EntityKind::TextMention.is_link());
        assert!(!EntityKind::CustomEmoji.is_link());
    }
}
