// Scoring chain - runs a filter's rules in order and keeps the worst score.

use super::command_router::AdminCommandHandler;
use super::moderation_models::{ChatMessage, ModerationError, ScoringResult};
use async_trait::async_trait;
use std::sync::Arc;

/// A single scoring rule.
///
/// Scores range from 0 to 100. A rule that cannot evaluate a message
/// returns 0 with a reason instead of failing.
#[async_trait]
pub trait FilteringRule: Send + Sync {
    async fn score(&self, message: &ChatMessage) -> ScoringResult;

    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Stop the chain as soon as this rule raises the maximum.
    fn is_final(&self) -> bool;

    /// Load persisted rule state. Called once at startup.
    async fn load_state(&self) -> Result<(), ModerationError> {
        Ok(())
    }

    /// Admin sub-commands exposed under the rule's prefix.
    fn admin_commands(&self) -> Option<(String, Arc<dyn AdminCommandHandler>)> {
        None
    }
}

pub struct ScoringChain {
    rules: Vec<Arc<dyn FilteringRule>>,
}

impl ScoringChain {
    pub fn new(rules: Vec<Arc<dyn FilteringRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Arc<dyn FilteringRule>] {
        &self.rules
    }

    /// Score a message with every rule and return the highest result.
    ///
    /// Only a strictly higher score replaces the current maximum, so on a tie
    /// the earlier rule's reason wins and a tying final rule does not stop the
    /// chain.
    pub async fn score(&self, message: &ChatMessage) -> ScoringResult {
        let mut max = ScoringResult::pass();

        for rule in &self.rules {
            let result = rule.score(message).await;
            tracing::trace!(
                rule = rule.name(),
                score = result.score,
                reason = %result.reason,
                "Rule scored message"
            );

            if result.score > max.score {
                max = result;
                if rule.is_final() {
                    tracing::debug!(rule = rule.name(), "Final rule matched, stopping chain");
                    break;
                }
            }
        }

        max
    }

    pub async fn load_state(&self) -> Result<(), ModerationError> {
        for rule in &self.rules {
            rule.load_state().await?;
        }
        Ok(())
    }
}
