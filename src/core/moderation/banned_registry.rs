// Banned-user registry - the global list of users banned by any filter.
//
// Stored in its own namespace as "<varint user id>" -> "1". Admins manage it
// through the `bandb` command prefix.

use super::command_router::{AdminCommandHandler, CommandContext};
use super::moderation_models::ModerationError;
use super::state_store::{id_to_key, key_to_id, KvStore};
use async_trait::async_trait;
use std::sync::Arc;

pub const BANNED_NAMESPACE: &str = "banned_db";
pub const BANDB_PREFIX: &str = "bandb";

const BANNED_MARKER: &[u8] = b"1";

const HELP: &str = "Supported commands:\n\
   list - show banned user ids\n\
   ban <user id> - ban user and remove their messages\n\
   bannodel <user id> - ban user but keep their messages\n\
   unban <user id> - remove user from the banned list\n\
   help - show this message";

pub struct BannedRegistry {
    store: Arc<dyn KvStore>,
}

impl BannedRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Idempotent: banning twice leaves a single entry.
    pub async fn ban(&self, user_id: i64) -> Result<(), ModerationError> {
        self.store.set(&id_to_key(user_id), BANNED_MARKER).await
    }

    pub async fn unban(&self, user_id: i64) -> Result<(), ModerationError> {
        self.store.delete(&id_to_key(user_id)).await
    }

    /// A failed read counts as "not banned".
    pub async fn is_banned(&self, user_id: i64) -> bool {
        match self.store.get(&id_to_key(user_id)).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                tracing::warn!(user_id, "Banned registry lookup failed: {}", e);
                false
            }
        }
    }

    pub async fn list_banned(&self) -> Result<Vec<i64>, ModerationError> {
        let mut ids = Vec::new();
        for key in self.store.keys().await? {
            match key_to_id(&key) {
                Ok(id) => ids.push(id),
                Err(_) => tracing::warn!("Skipping malformed key in banned registry: {:?}", key),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn ban_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
        revoke_messages: bool,
    ) -> Result<(), ModerationError> {
        let user_id = parse_user_id(ctx, tokens).await?;

        if let Err(e) = self.ban(user_id).await {
            ctx.notify(&format!("cannot ban user: {}", e)).await;
            return Err(e);
        }
        if let Err(e) = ctx
            .platform
            .ban_user(ctx.conversation_id, user_id, revoke_messages)
            .await
        {
            ctx.notify(&format!("cannot ban user: {}", e)).await;
            return Err(e.into());
        }

        tracing::info!(user_id, issuer_id = ctx.issuer_id, "User banned by admin");
        ctx.reply(&format!("User {} banned", user_id)).await
    }
}

async fn parse_user_id(ctx: &CommandContext, tokens: &[String]) -> Result<i64, ModerationError> {
    let Some(raw) = tokens.first() else {
        ctx.notify("User id was not specified").await;
        return Err(ModerationError::InvalidCommand(
            "user id was not specified".to_string(),
        ));
    };
    match raw.parse::<i64>() {
        Ok(id) => Ok(id),
        Err(_) => {
            ctx.notify(&format!("Invalid user id: {}", raw)).await;
            Err(ModerationError::InvalidUserId(raw.clone()))
        }
    }
}

#[async_trait]
impl AdminCommandHandler for BannedRegistry {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        let Some((command, args)) = tokens.split_first() else {
            ctx.notify(HELP).await;
            return Err(ModerationError::InvalidCommand(
                "bandb command was not specified".to_string(),
            ));
        };

        match command.to_lowercase().as_str() {
            "list" => {
                let ids = match self.list_banned().await {
                    Ok(ids) => ids,
                    Err(e) => {
                        ctx.notify(&format!("cannot list banned users: {}", e)).await;
                        return Err(e);
                    }
                };
                let text = if ids.is_empty() {
                    "No banned users".to_string()
                } else {
                    let lines: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                    format!("Banned users:\n{}", lines.join("\n"))
                };
                ctx.reply(&text).await
            }
            "ban" => self.ban_command(ctx, args, true).await,
            "bannodel" => self.ban_command(ctx, args, false).await,
            "unban" => {
                let user_id = parse_user_id(ctx, args).await?;
                if let Err(e) = self.unban(user_id).await {
                    ctx.notify(&format!("cannot unban user: {}", e)).await;
                    return Err(e);
                }
                tracing::info!(user_id, issuer_id = ctx.issuer_id, "User unbanned by admin");
                ctx.reply(&format!("User {} unbanned", user_id)).await
            }
            "help" => ctx.reply(HELP).await,
            other => {
                ctx.notify(HELP).await;
                Err(ModerationError::NotSupported(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::command_router::tokenize;
    use crate::core::moderation::test_support::{FailingStore, MockPlatform, PlatformCall};
    use crate::infra::moderation::InMemoryKvStore;

    fn registry() -> BannedRegistry {
        BannedRegistry::new(Arc::new(InMemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_ban_is_idempotent() {
        let registry = registry();
        registry.ban(42).await.unwrap();
        registry.ban(42).await.unwrap();

        assert!(registry.is_banned(42).await);
        assert_eq!(registry.list_banned().await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn test_unban_clears_entry() {
        let registry = registry();
        registry.ban(-7).await.unwrap();
        registry.unban(-7).await.unwrap();
        registry.unban(-7).await.unwrap();

        assert!(!registry.is_banned(-7).await);
        assert!(registry.list_banned().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_reads_as_not_banned() {
        let registry = BannedRegistry::new(Arc::new(FailingStore));
        assert!(!registry.is_banned(1).await);
    }

    #[tokio::test]
    async fn test_ban_command_bans_on_platform() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let registry = registry();

        registry
            .handle_command(&ctx, &tokenize("bannodel 55"))
            .await
            .unwrap();

        assert!(registry.is_banned(55).await);
        assert!(platform.calls().contains(&PlatformCall::Ban {
            conversation_id: -100,
            user_id: 55,
            revoke_messages: false,
        }));
    }

    #[tokio::test]
    async fn test_ban_command_reports_platform_failure() {
        let platform = MockPlatform::new();
        platform.fail_bans();
        let ctx = platform.command_context(-100);
        let registry = registry();

        let result = registry.handle_command(&ctx, &tokenize("ban 55")).await;

        assert!(matches!(result, Err(ModerationError::Platform(_))));
        assert!(platform
            .sent_texts()
            .iter()
            .any(|t| t.starts_with("cannot ban user: ")));
    }

    #[tokio::test]
    async fn test_invalid_user_id_rejected() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let registry = registry();

        let result = registry.handle_command(&ctx, &tokenize("unban abc")).await;

        assert!(matches!(result, Err(ModerationError::InvalidUserId(raw)) if raw == "abc"));
    }

    #[tokio::test]
    async fn test_list_command_shows_ids() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let registry = registry();
        registry.ban(3).await.unwrap();
        registry.ban(1).await.unwrap();

        registry
            .handle_command(&ctx, &tokenize("list"))
            .await
            .unwrap();

        assert_eq!(platform.sent_texts(), vec!["Banned users:\n1\n3".to_string()]);
    }

    #[tokio::test]
    async fn test_list_command_reports_store_failure() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let registry = BannedRegistry::new(Arc::new(FailingStore));

        let result = registry.handle_command(&ctx, &tokenize("list")).await;

        assert!(matches!(result, Err(ModerationError::StorageError(_))));
        assert_eq!(platform.sent_texts().len(), 1);
        assert!(platform.sent_texts()[0].starts_with("cannot list banned users: "));
    }
}
