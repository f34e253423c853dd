// Admin command routing - maps the first token of an admin command to a handler.
//
// Routers nest: the engine routes "<filter name> ..." to a filter, which routes
// "<rule name> ..." to a rule, and so on. Listings are always generated from
// the registered prefixes.

use super::moderation_models::ModerationError;
use super::platform::{send_notice, ChatPlatform};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where an admin command came from and where replies go.
#[derive(Clone)]
pub struct CommandContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub conversation_id: i64,
    /// The command message, if there is one to reply to.
    pub message_id: Option<i64>,
    pub issuer_id: i64,
}

impl CommandContext {
    pub async fn reply(&self, text: &str) -> Result<(), ModerationError> {
        self.platform
            .send_message(self.conversation_id, self.message_id, text)
            .await?;
        Ok(())
    }

    /// Reply and only log a failure.
    pub async fn notify(&self, text: &str) {
        send_notice(
            self.platform.as_ref(),
            self.conversation_id,
            self.message_id,
            text,
        )
        .await;
    }
}

#[async_trait]
pub trait AdminCommandHandler: Send + Sync {
    /// Handle the tokens left after the handler's own prefix was stripped.
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError>;
}

#[derive(Clone, Default)]
pub struct CommandRouter {
    handlers: BTreeMap<String, Arc<dyn AdminCommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes are case-insensitive. Registering a prefix twice replaces the
    /// earlier handler.
    pub fn register(&mut self, prefix: &str, handler: Arc<dyn AdminCommandHandler>) {
        let prefix = prefix.to_lowercase();
        if self.handlers.insert(prefix.clone(), handler).is_some() {
            tracing::warn!(prefix = %prefix, "Admin command prefix registered twice");
        }
    }

    pub fn listing(&self) -> String {
        let mut text = String::from("Available sub-commands:\n");
        for prefix in self.handlers.keys() {
            text.push_str("   ");
            text.push_str(prefix);
            text.push('\n');
        }
        text
    }

    pub async fn dispatch(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        let Some((first, rest)) = tokens.split_first() else {
            ctx.notify(&format!("Sub-command was not specified.\n{}", self.listing()))
                .await;
            return Err(ModerationError::InvalidCommand(
                "sub-command was not specified".to_string(),
            ));
        };

        match self.handlers.get(&first.to_lowercase()) {
            Some(handler) => handler.handle_command(ctx, rest).await,
            None => {
                ctx.notify(&format!(
                    "Unknown sub-command `{}`.\n{}",
                    first,
                    self.listing()
                ))
                .await;
                Err(ModerationError::NotSupported(first.clone()))
            }
        }
    }
}

/// Split an admin command into tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::test_support::MockPlatform;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AdminCommandHandler for Recorder {
        async fn handle_command(
            &self,
            _ctx: &CommandContext,
            tokens: &[String],
        ) -> Result<(), ModerationError> {
            self.seen.lock().unwrap().push(tokens.to_vec());
            Ok(())
        }
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_dispatch_strips_prefix() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let handler = recorder();
        let mut router = CommandRouter::new();
        router.register("bandb", handler.clone());

        router
            .dispatch(&ctx, &tokenize("BanDB ban 42"))
            .await
            .unwrap();

        assert_eq!(
            handler.seen.lock().unwrap().clone(),
            vec![vec!["ban".to_string(), "42".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_empty_command_lists_prefixes() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let mut router = CommandRouter::new();
        router.register("spam", recorder());
        router.register("bandb", recorder());

        let result = router.dispatch(&ctx, &[]).await;

        assert!(matches!(result, Err(ModerationError::InvalidCommand(_))));
        let sent = platform.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("   bandb\n   spam\n"));
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_not_supported() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let mut router = CommandRouter::new();
        router.register("bandb", recorder());

        let result = router.dispatch(&ctx, &tokenize("nope list")).await;

        assert!(matches!(result, Err(ModerationError::NotSupported(p)) if p == "nope"));
        assert!(platform.sent_texts()[0].contains("bandb"));
    }

    #[test]
    fn test_prefixes_are_lowercased_and_sorted() {
        let mut router = CommandRouter::new();
        router.register("User", recorder());
        router.register("bandb", recorder());
        assert_eq!(router.listing(), "Available sub-commands:\n   bandb\n   user\n");
    }
}
