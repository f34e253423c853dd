// Action pipeline - runs a filter's actions once a verdict is reached.
//
// Execution is best-effort: a failing action is logged and recorded in the
// report, and the remaining actions still run.

use super::moderation_models::{ChatMessage, ModerationError, ScoringResult};
use super::vacations::VacationList;
use async_trait::async_trait;
use std::sync::Arc;

/// Verdict details handed to every action.
pub struct ActionContext<'a> {
    pub score: &'a ScoringResult,
    /// Present when the caller tracks admin vacations.
    pub vacations: Option<&'a VacationList>,
}

/// What the pipeline acts on.
pub struct ActionTarget<'a> {
    /// The message that triggered the verdict.
    pub message: &'a ChatMessage,
    /// Every message id the verdict covers (the tracked history on a ban).
    pub message_ids: &'a [i64],
    pub user_id: i64,
}

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Per-message actions receive the whole triggering message; the rest
    /// receive the conversation, the message ids and the user id.
    fn per_message(&self) -> bool;

    async fn apply_to_message(
        &self,
        ctx: &ActionContext<'_>,
        message: &ChatMessage,
    ) -> Result<(), ModerationError>;

    async fn apply(
        &self,
        ctx: &ActionContext<'_>,
        conversation_id: i64,
        message_ids: &[i64],
        user_id: i64,
    ) -> Result<(), ModerationError>;
}

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub succeeded: Vec<String>,
    /// (action name, error text)
    pub failed: Vec<(String, String)>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct ActionPipeline {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionPipeline {
    pub fn new(actions: Vec<Arc<dyn Action>>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub async fn run(&self, ctx: &ActionContext<'_>, target: ActionTarget<'_>) -> PipelineReport {
        let mut report = PipelineReport::default();

        for action in &self.actions {
            let result = if action.per_message() {
                action.apply_to_message(ctx, target.message).await
            } else {
                action
                    .apply(
                        ctx,
                        target.message.conversation_id,
                        target.message_ids,
                        target.user_id,
                    )
                    .await
            };

            match result {
                Ok(()) => report.succeeded.push(action.name().to_string()),
                Err(e) => {
                    tracing::error!(
                        action = action.name(),
                        kind = action.kind(),
                        user_id = target.user_id,
                        "Moderation action failed: {}",
                        e
                    );
                    report.failed.push((action.name().to_string(), e.to_string()));
                }
            }
        }

        report
    }
}
