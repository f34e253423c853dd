// Built-in filtering rules.
//
// All rules are stateless with respect to users. The regex rule keeps its
// pattern list in its own store namespace so admins can edit it at runtime.

use super::command_router::{AdminCommandHandler, CommandContext};
use super::moderation_config::RuleConfig;
use super::moderation_models::{ChatMessage, EntityKind, ModerationError, ScoringResult};
use super::scoring_chain::FilteringRule;
use super::state_store::{load_json, save_json, KvStore};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const PATTERNS_KEY: &[u8] = b"config";

// ============================================================================
// REGEX
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct PatternRecord {
    patterns: Vec<String>,
}

#[derive(Default)]
struct CompiledPatterns {
    sources: Vec<String>,
    compiled: Vec<Regex>,
}

impl CompiledPatterns {
    /// Add a pattern unless it is a duplicate. Invalid patterns are errors.
    fn push(&mut self, source: String) -> Result<bool, regex::Error> {
        if self.sources.contains(&source) {
            return Ok(false);
        }
        let compiled = Regex::new(&source)?;
        self.sources.push(source);
        self.compiled.push(compiled);
        Ok(true)
    }

    fn remove(&mut self, source: &str) -> bool {
        match self.sources.iter().position(|s| s == source) {
            Some(index) => {
                self.sources.remove(index);
                self.compiled.remove(index);
                true
            }
            None => false,
        }
    }

    fn record(&self) -> PatternRecord {
        PatternRecord {
            patterns: self.sources.clone(),
        }
    }
}

/// Pattern list shared between the rule and its admin commands.
pub struct PatternBook {
    rule_name: String,
    case_sensitive: bool,
    initial: Vec<String>,
    store: Arc<dyn KvStore>,
    patterns: RwLock<CompiledPatterns>,
}

impl PatternBook {
    fn normalize(&self, pattern: &str) -> String {
        if self.case_sensitive {
            pattern.to_string()
        } else {
            pattern.to_lowercase()
        }
    }

    async fn load(&self) -> Result<(), ModerationError> {
        let sources = match load_json::<PatternRecord>(self.store.as_ref(), PATTERNS_KEY).await {
            Ok(Some(record)) => record.patterns,
            Ok(None) => self.initial.clone(),
            Err(e) => {
                tracing::warn!(rule = %self.rule_name, "Stored patterns unreadable, using initial list: {}", e);
                self.initial.clone()
            }
        };

        let mut patterns = CompiledPatterns::default();
        for source in sources {
            let source = self.normalize(&source);
            if let Err(e) = patterns.push(source.clone()) {
                tracing::warn!(rule = %self.rule_name, pattern = %source, "Skipping invalid pattern: {}", e);
            }
        }
        tracing::info!(rule = %self.rule_name, count = patterns.sources.len(), "Regex patterns loaded");
        *self.patterns.write().await = patterns;
        Ok(())
    }

    async fn first_match(&self, message: &ChatMessage) -> Option<String> {
        let text = self.normalize(&message.text);
        let caption = self.normalize(message.caption());
        let patterns = self.patterns.read().await;
        patterns
            .compiled
            .iter()
            .find(|re| re.is_match(&text) || re.is_match(&caption))
            .map(|re| re.as_str().to_string())
    }

    async fn is_empty(&self) -> bool {
        self.patterns.read().await.sources.is_empty()
    }

    async fn add(&self, ctx: &CommandContext, tokens: &[String]) -> Result<(), ModerationError> {
        let source = self.normalize(&tokens.join(" "));
        if source.is_empty() {
            ctx.notify("Regex cannot be empty").await;
            return Err(ModerationError::InvalidCommand("regex cannot be empty".to_string()));
        }

        let mut patterns = self.patterns.write().await;
        match patterns.push(source.clone()) {
            Ok(true) => {}
            Ok(false) => return ctx.reply(&format!("Regex already exists: {}", source)).await,
            Err(e) => {
                ctx.notify(&format!("Invalid regex: {}", e)).await;
                return Err(ModerationError::InvalidCommand(e.to_string()));
            }
        }

        if let Err(e) = save_json(self.store.as_ref(), PATTERNS_KEY, &patterns.record()).await {
            patterns.remove(&source);
            ctx.notify(&format!("Failed to save config: {}", e)).await;
            return Err(e);
        }
        drop(patterns);

        tracing::info!(rule = %self.rule_name, pattern = %source, "Regex added");
        ctx.reply("Done").await
    }

    async fn delete(&self, ctx: &CommandContext, tokens: &[String]) -> Result<(), ModerationError> {
        let source = self.normalize(&tokens.join(" "));
        let mut patterns = self.patterns.write().await;
        if !patterns.remove(&source) {
            return ctx.reply(&format!("Regex not found: {}", source)).await;
        }

        if let Err(e) = save_json(self.store.as_ref(), PATTERNS_KEY, &patterns.record()).await {
            ctx.notify(&format!("Failed to save config: {}", e)).await;
            return Err(e);
        }
        drop(patterns);

        tracing::info!(rule = %self.rule_name, pattern = %source, "Regex removed");
        ctx.reply("Done").await
    }
}

#[async_trait]
impl AdminCommandHandler for PatternBook {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        let (command, args) = match tokens.split_first() {
            Some((command, args)) => (command.to_lowercase(), args),
            None => ("help".to_string(), tokens),
        };

        match command.as_str() {
            "help" => {
                ctx.reply(
                    "Commands allow to add, list or remove filtering regex:\n\n   help\n   list\n   add <regex>\n   del <regex>\n",
                )
                .await
            }
            "list" => {
                let patterns = self.patterns.read().await;
                let mut text = String::from("List of configured regexes:\n\n");
                for source in &patterns.sources {
                    text.push_str("   ");
                    text.push_str(source);
                    text.push('\n');
                }
                text.push_str("End of list");
                drop(patterns);
                ctx.reply(&text).await
            }
            "add" => self.add(ctx, args).await,
            "del" => self.delete(ctx, args).await,
            other => {
                ctx.notify(&format!("Unknown regex command: {}", other)).await;
                Err(ModerationError::NotSupported(other.to_string()))
            }
        }
    }
}

pub struct RegexRule {
    name: String,
    is_final: bool,
    book: Arc<PatternBook>,
}

impl RegexRule {
    pub const KIND: &'static str = "regex";
    pub const HELP: &'static str =
        "Matches text and caption against an editable list of regexes. Arguments: patterns, caseSensitive (default false), isFinal";

    pub fn from_config(config: &RuleConfig, store: Arc<dyn KvStore>) -> Result<Self, ModerationError> {
        let args = &config.arguments;
        Ok(Self {
            name: config.name.clone(),
            is_final: args.is_final()?,
            book: Arc::new(PatternBook {
                rule_name: config.name.clone(),
                case_sensitive: args.get_bool_or("caseSensitive", false)?,
                initial: args.get_string_list_or_empty("patterns")?,
                store,
                patterns: RwLock::new(CompiledPatterns::default()),
            }),
        })
    }
}

#[async_trait]
impl FilteringRule for RegexRule {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        if self.book.is_empty().await {
            return ScoringResult::new(0, "no regex patterns configured");
        }
        match self.book.first_match(message).await {
            Some(pattern) => {
                tracing::debug!(rule = %self.name, pattern = %pattern, "Regex match found");
                ScoringResult::ban(format!("regex match found: {}", pattern))
            }
            None => ScoringResult::pass(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.is_final
    }

    async fn load_state(&self) -> Result<(), ModerationError> {
        self.book.load().await
    }

    fn admin_commands(&self) -> Option<(String, Arc<dyn AdminCommandHandler>)> {
        Some((
            self.name.clone(),
            Arc::clone(&self.book) as Arc<dyn AdminCommandHandler>,
        ))
    }
}

// ============================================================================
// PARTIAL MATCH
// ============================================================================

pub struct PartialMatchRule {
    name: String,
    is_final: bool,
    needle: String,
    case_sensitive: bool,
}

impl PartialMatchRule {
    pub const KIND: &'static str = "partialMatch";
    pub const HELP: &'static str =
        "Matches a substring in text or caption. Arguments: match (required), caseSensitive (default false), isFinal";

    pub fn from_config(config: &RuleConfig) -> Result<Self, ModerationError> {
        let args = &config.arguments;
        let case_sensitive = args.get_bool_or("caseSensitive", false)?;
        let needle = args.get_string("match")?;
        if needle.is_empty() {
            return Err(ModerationError::ConfigError(
                "'match' argument must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: config.name.clone(),
            is_final: args.is_final()?,
            needle: if case_sensitive { needle } else { needle.to_lowercase() },
            case_sensitive,
        })
    }

    fn contains(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.needle)
        } else {
            haystack.to_lowercase().contains(&self.needle)
        }
    }
}

#[async_trait]
impl FilteringRule for PartialMatchRule {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        if self.contains(&message.text) || self.contains(message.caption()) {
            ScoringResult::ban(format!("Partial match found: {}", self.needle))
        } else {
            ScoringResult::pass()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}

// ============================================================================
// IS FORWARD
// ============================================================================

pub struct IsForwardRule {
    name: String,
    is_final: bool,
}

impl IsForwardRule {
    pub const KIND: &'static str = "isForward";
    pub const HELP: &'static str = "Flags forwarded messages. Arguments: isFinal";

    pub fn from_config(config: &RuleConfig) -> Result<Self, ModerationError> {
        Ok(Self {
            name: config.name.clone(),
            is_final: config.arguments.is_final()?,
        })
    }
}

#[async_trait]
impl FilteringRule for IsForwardRule {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        if message.is_forward {
            ScoringResult::ban("message is forwarded")
        } else {
            ScoringResult::pass()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}

// ============================================================================
// ENTITY COUNTS
// ============================================================================

pub struct HasLinksRule {
    name: String,
    is_final: bool,
    threshold: usize,
}

impl HasLinksRule {
    pub const KIND: &'static str = "hasLinks";
    pub const HELP: &'static str =
        "Flags messages with too many links, mentions or e-mails. Arguments: numLinks (default 1), isFinal";

    pub fn from_config(config: &RuleConfig) -> Result<Self, ModerationError> {
        Ok(Self {
            name: config.name.clone(),
            is_final: config.arguments.is_final()?,
            threshold: config.arguments.get_positive_or("numLinks", 1)?,
        })
    }
}

#[async_trait]
impl FilteringRule for HasLinksRule {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        let count = message.count_entities(EntityKind::is_link);
        if count >= self.threshold {
            ScoringResult::ban(format!(
                "found {} links, which is more or equal to the threshold {}",
                count, self.threshold
            ))
        } else {
            ScoringResult::pass()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}

pub struct HasEmojiRule {
    name: String,
    is_final: bool,
    threshold: usize,
}

impl HasEmojiRule {
    pub const KIND: &'static str = "hasEmoji";
    pub const HELP: &'static str =
        "Flags messages with too many custom emoji. Arguments: numEmojis (default 7), isFinal";

    pub fn from_config(config: &RuleConfig) -> Result<Self, ModerationError> {
        Ok(Self {
            name: config.name.clone(),
            is_final: config.arguments.is_final()?,
            threshold: config.arguments.get_positive_or("numEmojis", 7)?,
        })
    }
}

#[async_trait]
impl FilteringRule for HasEmojiRule {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        let count = message.count_entities(|kind| kind == EntityKind::CustomEmoji);
        if count >= self.threshold {
            ScoringResult::ban(format!(
                "found {} custom emoji, which is more or equal to the threshold {}",
                count, self.threshold
            ))
        } else {
            ScoringResult::pass()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.is_final
    }
}
