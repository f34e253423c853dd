// Test doubles shared by the moderation tests.

use super::command_router::CommandContext;
use super::moderation_models::{ChatMessage, ChatUser, MessageRef, ModerationError, ScoringResult};
use super::platform::{ChatPlatform, PlatformError};
use super::scoring_chain::FilteringRule;
use super::state_store::KvStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn message(id: i64, conversation_id: i64, user_id: i64, text: &str) -> ChatMessage {
    ChatMessage {
        id,
        conversation_id,
        sender: ChatUser {
            id: user_id,
            username: format!("user{}", user_id),
            is_bot: false,
        },
        text: text.to_string(),
        ..Default::default()
    }
}

// ============================================================================
// MOCK PLATFORM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Send {
        conversation_id: i64,
        reply_to: Option<i64>,
        text: String,
    },
    Delete {
        conversation_id: i64,
        message_ids: Vec<i64>,
    },
    Ban {
        conversation_id: i64,
        user_id: i64,
        revoke_messages: bool,
    },
    Forward {
        from: i64,
        to: i64,
        message_id: i64,
    },
}

/// Records every call; individual operations can be told to fail.
#[derive(Default)]
pub struct MockPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    admins: Mutex<Vec<ChatUser>>,
    next_message_id: AtomicI64,
    fail_bans: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_message_id: AtomicI64::new(10_000),
            ..Default::default()
        })
    }

    pub fn command_context(self: &Arc<Self>, conversation_id: i64) -> CommandContext {
        CommandContext {
            platform: Arc::clone(self) as Arc<dyn ChatPlatform>,
            conversation_id,
            message_id: Some(1),
            issuer_id: 1,
        }
    }

    pub fn set_admins(&self, admins: Vec<ChatUser>) {
        *self.admins.lock().unwrap() = admins;
    }

    pub fn fail_bans(&self) {
        self.fail_bans.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn conversation_administrators(
        &self,
        _conversation_id: i64,
    ) -> Result<Vec<ChatUser>, PlatformError> {
        Ok(self.admins.lock().unwrap().clone())
    }

    async fn send_message(
        &self,
        conversation_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<MessageRef, PlatformError> {
        self.record(PlatformCall::Send {
            conversation_id,
            reply_to,
            text: text.to_string(),
        });
        Ok(MessageRef {
            conversation_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn delete_messages(
        &self,
        conversation_id: i64,
        message_ids: &[i64],
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::Delete {
            conversation_id,
            message_ids: message_ids.to_vec(),
        });
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PlatformError::Api("delete refused".to_string()));
        }
        Ok(())
    }

    async fn ban_user(
        &self,
        conversation_id: i64,
        user_id: i64,
        revoke_messages: bool,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::Ban {
            conversation_id,
            user_id,
            revoke_messages,
        });
        if self.fail_bans.load(Ordering::SeqCst) {
            return Err(PlatformError::Api("missing permissions".to_string()));
        }
        Ok(())
    }

    async fn forward_or_copy_message(
        &self,
        from_conversation_id: i64,
        to_conversation_id: i64,
        message_id: i64,
    ) -> Result<MessageRef, PlatformError> {
        self.record(PlatformCall::Forward {
            from: from_conversation_id,
            to: to_conversation_id,
            message_id,
        });
        Ok(MessageRef {
            conversation_id: to_conversation_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        })
    }
}

// ============================================================================
// RULES AND STORES
// ============================================================================

/// Fixed-score rule that counts how often it ran. Its reason is its name.
pub struct SpyRule {
    name: String,
    score: i32,
    is_final: bool,
    calls: AtomicUsize,
}

impl SpyRule {
    pub fn new(name: &str, score: i32, is_final: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            score,
            is_final,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FilteringRule for SpyRule {
    async fn score(&self, _message: &ChatMessage) -> ScoringResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ScoringResult::new(self.score, self.name.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "spy"
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, ModerationError> {
        Err(ModerationError::StorageError("disk on fire".to_string()))
    }

    async fn set(&self, _key: &[u8], _value: &[u8]) -> Result<(), ModerationError> {
        Err(ModerationError::StorageError("disk on fire".to_string()))
    }

    async fn delete(&self, _key: &[u8]) -> Result<(), ModerationError> {
        Err(ModerationError::StorageError("disk on fire".to_string()))
    }

    async fn keys(&self) -> Result<Vec<Vec<u8>>, ModerationError> {
        Err(ModerationError::StorageError("disk on fire".to_string()))
    }
}
