// Component registry - maps configured kinds to constructors.
//
// Built once at startup and only read afterwards. New rules, actions or
// filters are added with `register_*` before the chain is built.

use super::action_pipeline::{Action, ActionPipeline};
use super::actions::{AddReportButton, DeleteAndBan, ForwardToChat};
use super::banned_registry::BannedRegistry;
use super::check_n_events::CheckNEventsFilter;
use super::moderation_config::{ActionConfig, ModerationConfig, RuleConfig, StatefulFilterConfig};
use super::moderation_models::ModerationError;
use super::platform::ChatPlatform;
use super::report_filter::ReportFilter;
use super::rules::{HasEmojiRule, HasLinksRule, IsForwardRule, PartialMatchRule, RegexRule};
use super::scoring_chain::{FilteringRule, ScoringChain};
use super::state_store::StoreProvider;
use super::stateful_filter::StatefulFilter;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared services handed to every constructor.
#[derive(Clone)]
pub struct BuildContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub stores: Arc<dyn StoreProvider>,
    pub banned: Arc<BannedRegistry>,
}

pub type RuleFactory = Box<
    dyn Fn(&BuildContext, &RuleConfig) -> Result<Arc<dyn FilteringRule>, ModerationError>
        + Send
        + Sync,
>;

pub type ActionFactory = Box<
    dyn Fn(&BuildContext, &ActionConfig) -> Result<Arc<dyn Action>, ModerationError> + Send + Sync,
>;

pub type FilterFactory = Box<
    dyn Fn(
            &BuildContext,
            &StatefulFilterConfig,
            ScoringChain,
            ActionPipeline,
        ) -> Result<Arc<dyn StatefulFilter>, ModerationError>
        + Send
        + Sync,
>;

struct Entry<F> {
    help: &'static str,
    factory: F,
}

#[derive(Default)]
pub struct Registry {
    rules: BTreeMap<String, Entry<RuleFactory>>,
    actions: BTreeMap<String, Entry<ActionFactory>>,
    filters: BTreeMap<String, Entry<FilterFactory>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.register_rule(RegexRule::KIND, RegexRule::HELP, |ctx, config| {
            let store = ctx.stores.open(&format!("{}_config", config.name));
            Ok(Arc::new(RegexRule::from_config(config, store)?))
        });
        registry.register_rule(PartialMatchRule::KIND, PartialMatchRule::HELP, |_, config| {
            Ok(Arc::new(PartialMatchRule::from_config(config)?))
        });
        registry.register_rule(IsForwardRule::KIND, IsForwardRule::HELP, |_, config| {
            Ok(Arc::new(IsForwardRule::from_config(config)?))
        });
        registry.register_rule(HasLinksRule::KIND, HasLinksRule::HELP, |_, config| {
            Ok(Arc::new(HasLinksRule::from_config(config)?))
        });
        registry.register_rule(HasEmojiRule::KIND, HasEmojiRule::HELP, |_, config| {
            Ok(Arc::new(HasEmojiRule::from_config(config)?))
        });

        registry.register_action(DeleteAndBan::KIND, DeleteAndBan::HELP, |ctx, config| {
            Ok(Arc::new(DeleteAndBan::from_config(Arc::clone(&ctx.platform), config)?))
        });
        registry.register_action(ForwardToChat::KIND, ForwardToChat::HELP, |ctx, config| {
            Ok(Arc::new(ForwardToChat::from_config(Arc::clone(&ctx.platform), config)?))
        });
        registry.register_action(AddReportButton::KIND, AddReportButton::HELP, |ctx, config| {
            Ok(Arc::new(AddReportButton::from_config(Arc::clone(&ctx.platform), config)?))
        });

        registry.register_filter(
            CheckNEventsFilter::KIND,
            CheckNEventsFilter::HELP,
            |ctx, config, chain, pipeline| {
                Ok(Arc::new(CheckNEventsFilter::from_config(ctx, config, chain, pipeline)?))
            },
        );
        registry.register_filter(
            ReportFilter::KIND,
            ReportFilter::HELP,
            |ctx, config, chain, pipeline| {
                if !chain.rules().is_empty() {
                    tracing::warn!(filter = %config.name, "Report filter ignores configured rules");
                }
                Ok(Arc::new(ReportFilter::from_config(ctx, config, pipeline)?))
            },
        );

        registry
    }

    pub fn register_rule<F>(&mut self, kind: &str, help: &'static str, factory: F)
    where
        F: Fn(&BuildContext, &RuleConfig) -> Result<Arc<dyn FilteringRule>, ModerationError>
            + Send
            + Sync
            + 'static,
    {
        self.rules.insert(
            kind.to_string(),
            Entry {
                help,
                factory: Box::new(factory),
            },
        );
    }

    pub fn register_action<F>(&mut self, kind: &str, help: &'static str, factory: F)
    where
        F: Fn(&BuildContext, &ActionConfig) -> Result<Arc<dyn Action>, ModerationError>
            + Send
            + Sync
            + 'static,
    {
        self.actions.insert(
            kind.to_string(),
            Entry {
                help,
                factory: Box::new(factory),
            },
        );
    }

    pub fn register_filter<F>(&mut self, kind: &str, help: &'static str, factory: F)
    where
        F: Fn(
                &BuildContext,
                &StatefulFilterConfig,
                ScoringChain,
                ActionPipeline,
            ) -> Result<Arc<dyn StatefulFilter>, ModerationError>
            + Send
            + Sync
            + 'static,
    {
        self.filters.insert(
            kind.to_string(),
            Entry {
                help,
                factory: Box::new(factory),
            },
        );
    }

    pub fn build_rule(
        &self,
        ctx: &BuildContext,
        config: &RuleConfig,
    ) -> Result<Arc<dyn FilteringRule>, ModerationError> {
        let entry = self.rules.get(&config.kind).ok_or_else(|| {
            ModerationError::ConfigError(format!("unknown filtering rule kind '{}'", config.kind))
        })?;
        (entry.factory)(ctx, config)
    }

    pub fn build_action(
        &self,
        ctx: &BuildContext,
        config: &ActionConfig,
    ) -> Result<Arc<dyn Action>, ModerationError> {
        let entry = self.actions.get(&config.kind).ok_or_else(|| {
            ModerationError::ConfigError(format!("unknown action kind '{}'", config.kind))
        })?;
        (entry.factory)(ctx, config)
    }

    /// Build one stateful filter with its rules and actions, then load its state.
    pub async fn build_filter(
        &self,
        ctx: &BuildContext,
        config: &StatefulFilterConfig,
    ) -> Result<Arc<dyn StatefulFilter>, ModerationError> {
        let entry = self.filters.get(&config.kind).ok_or_else(|| {
            ModerationError::ConfigError(format!("unknown stateful filter kind '{}'", config.kind))
        })?;

        let rules = config
            .rules
            .iter()
            .map(|rule| self.build_rule(ctx, rule))
            .collect::<Result<Vec<_>, _>>()?;
        let actions = config
            .actions
            .iter()
            .map(|action| self.build_action(ctx, action))
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = ActionPipeline::new(actions);
        if pipeline.is_empty() {
            tracing::warn!(filter = %config.name, "Filter has no actions configured; verdicts are only logged");
        }

        let filter = (entry.factory)(ctx, config, ScoringChain::new(rules), pipeline)?;
        filter.load_state().await?;

        tracing::info!(
            filter = %config.name,
            kind = %config.kind,
            rules = config.rules.len(),
            actions = config.actions.len(),
            "Stateful filter ready"
        );
        Ok(filter)
    }

    /// Build every configured filter, in configuration order.
    pub async fn build_filters(
        &self,
        ctx: &BuildContext,
        config: &ModerationConfig,
    ) -> Result<Vec<Arc<dyn StatefulFilter>>, ModerationError> {
        let mut filters = Vec::with_capacity(config.filters.len());
        for filter_config in &config.filters {
            filters.push(self.build_filter(ctx, filter_config).await?);
        }
        Ok(filters)
    }

    /// Every known kind with its help text.
    pub fn help(&self) -> String {
        let mut text = String::new();
        append_section(&mut text, "Stateful filters", &self.filters);
        append_section(&mut text, "Filtering rules", &self.rules);
        append_section(&mut text, "Actions", &self.actions);
        text
    }
}

fn append_section<F>(text: &mut String, title: &str, entries: &BTreeMap<String, Entry<F>>) {
    text.push_str(title);
    text.push_str(":\n");
    for (kind, entry) in entries {
        text.push_str(&format!("   {} - {}\n", kind, entry.help));
    }
    text.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_config::Arguments;
    use crate::core::moderation::test_support::{message, MockPlatform};
    use crate::infra::moderation::{InMemoryKvStore, InMemoryStoreProvider};
    use serde_json::json;

    fn build_context() -> BuildContext {
        BuildContext {
            platform: MockPlatform::new(),
            stores: Arc::new(InMemoryStoreProvider::new()),
            banned: Arc::new(BannedRegistry::new(Arc::new(InMemoryKvStore::new()))),
        }
    }

    fn args(value: serde_json::Value) -> Arguments {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_help_lists_builtins() {
        let help = Registry::with_builtins().help();
        for kind in [
            "checkNevents",
            "report",
            "regex",
            "partialMatch",
            "isForward",
            "hasLinks",
            "hasEmoji",
            "deleteAndBan",
            "forwardToChat",
            "addReportButton",
        ] {
            assert!(help.contains(&format!("   {} - ", kind)), "missing {}", kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let registry = Registry::with_builtins();
        let result = registry.build_rule(
            &build_context(),
            &RuleConfig {
                name: "x".to_string(),
                kind: "magic".to_string(),
                arguments: Arguments::default(),
            },
        );
        assert!(matches!(result, Err(ModerationError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_builds_configured_filter() {
        let registry = Registry::with_builtins();
        let config = StatefulFilterConfig {
            name: "newcomers".to_string(),
            kind: "checkNevents".to_string(),
            arguments: args(json!({"n": 2, "isFinal": true})),
            rules: vec![RuleConfig {
                name: "words".to_string(),
                kind: "regex".to_string(),
                arguments: args(json!({"patterns": ["casino"]})),
            }],
            actions: vec![ActionConfig {
                name: String::new(),
                kind: "deleteAndBan".to_string(),
                arguments: Arguments::default(),
            }],
        };

        let filter = registry.build_filter(&build_context(), &config).await.unwrap();

        assert_eq!(filter.name(), "newcomers");
        assert!(filter.is_final());
        assert!(filter.score(&message(1, -100, 7, "Casino!")).await.is_ban());
    }

    #[tokio::test]
    async fn test_check_n_events_requires_n() {
        let registry = Registry::with_builtins();
        let config = StatefulFilterConfig {
            name: "newcomers".to_string(),
            kind: "checkNevents".to_string(),
            ..Default::default()
        };

        let result = registry.build_filter(&build_context(), &config).await;

        assert!(matches!(result, Err(ModerationError::ConfigError(m)) if m.contains("'n'")));
    }

    #[tokio::test]
    async fn test_custom_rule_registration() {
        use crate::core::moderation::test_support::SpyRule;

        let mut registry = Registry::empty();
        registry.register_rule("always", "always bans", |_, config| {
            Ok(SpyRule::new(&config.name, 100, true) as Arc<dyn FilteringRule>)
        });

        let rule = registry
            .build_rule(
                &build_context(),
                &RuleConfig {
                    name: "a".to_string(),
                    kind: "always".to_string(),
                    arguments: Arguments::default(),
                },
            )
            .unwrap();

        assert_eq!(rule.name(), "a");
        assert!(registry.help().contains("always - always bans"));
    }
}
