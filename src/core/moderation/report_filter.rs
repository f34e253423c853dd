// Report filter - lets members flag a message by replying with `/report`.
//
// Each reported message is acted on once; later reports of the same message
// get an "already reported" answer. Admins can mark themselves as on
// vacation so report notices stop pinging them.

use super::action_pipeline::{ActionContext, ActionPipeline, ActionTarget};
use super::command_router::{AdminCommandHandler, CommandContext, CommandRouter};
use super::moderation_config::StatefulFilterConfig;
use super::moderation_models::{ChatMessage, ModerationError, ReportState, ScoringResult};
use super::platform::{send_notice, ChatPlatform};
use super::registry::BuildContext;
use super::state_store::{id_to_key, load_json, save_json, KvStore};
use super::stateful_filter::StatefulFilter;
use super::vacations::{SweepHandle, VacationList, VACATION_PREFIX};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_TRIGGER: &str = "/report";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub trigger: String,
    pub is_final: bool,
    /// Delete the `/report` message itself.
    pub remove_report_message: bool,
    pub sweep_interval: Duration,
}

pub struct ReportFilter {
    name: String,
    settings: ReportSettings,
    store: Arc<dyn KvStore>,
    platform: Arc<dyn ChatPlatform>,
    pipeline: ActionPipeline,
    vacations: Arc<VacationList>,
    sweeper: Mutex<Option<SweepHandle>>,
    commands: CommandRouter,
}

impl ReportFilter {
    pub const KIND: &'static str = "report";
    pub const HELP: &'static str =
        "Acts on messages members reply to with /report. Arguments: trigger (default /report), removeReportMsg (default true), vacationSweepSecs (default 60), isFinal";

    /// Must be called from within a tokio runtime: it starts the vacation sweep.
    pub fn new(
        name: &str,
        settings: ReportSettings,
        store: Arc<dyn KvStore>,
        platform: Arc<dyn ChatPlatform>,
        pipeline: ActionPipeline,
    ) -> Self {
        let vacations = Arc::new(VacationList::new());
        let sweeper = vacations.spawn_sweeper(settings.sweep_interval);

        let mut commands = CommandRouter::new();
        commands.register(
            VACATION_PREFIX,
            Arc::clone(&vacations) as Arc<dyn AdminCommandHandler>,
        );

        Self {
            name: name.to_string(),
            settings,
            store,
            platform,
            pipeline,
            vacations,
            sweeper: Mutex::new(Some(sweeper)),
            commands,
        }
    }

    pub fn from_config(
        ctx: &BuildContext,
        config: &StatefulFilterConfig,
        pipeline: ActionPipeline,
    ) -> Result<Self, ModerationError> {
        let args = &config.arguments;
        let sweep_secs = args.get_positive_or("vacationSweepSecs", DEFAULT_SWEEP_INTERVAL.as_secs() as i64)?;
        let settings = ReportSettings {
            trigger: args.get_string_or("trigger", DEFAULT_TRIGGER)?,
            is_final: args.is_final()?,
            remove_report_message: args.get_bool_or("removeReportMsg", true)?,
            sweep_interval: Duration::from_secs(sweep_secs as u64),
        };
        if settings.trigger.is_empty() {
            return Err(ModerationError::ConfigError(
                "'trigger' argument must not be empty".to_string(),
            ));
        }
        let store = ctx.stores.open(&format!("{}_state", config.name));

        Ok(Self::new(
            &config.name,
            settings,
            store,
            Arc::clone(&ctx.platform),
            pipeline,
        ))
    }

    pub async fn report_state(
        &self,
        reported_message_id: i64,
    ) -> Result<Option<ReportState>, ModerationError> {
        load_json(self.store.as_ref(), &id_to_key(reported_message_id)).await
    }

    fn is_report(&self, message: &ChatMessage) -> bool {
        message.text.starts_with(&self.settings.trigger)
    }

    async fn remove_report_message(&self, message: &ChatMessage) {
        if !self.settings.remove_report_message {
            return;
        }
        if let Err(e) = self
            .platform
            .delete_messages(message.conversation_id, &[message.id])
            .await
        {
            tracing::warn!(filter = %self.name, message_id = message.id, "Failed to delete report message: {}", e);
        }
    }
}

#[async_trait]
impl StatefulFilter for ReportFilter {
    async fn score(&self, message: &ChatMessage) -> ScoringResult {
        if !self.is_report(message) {
            return ScoringResult::pass();
        }

        let Some(reported) = message.reply_to.as_deref() else {
            send_notice(
                self.platform.as_ref(),
                message.conversation_id,
                Some(message.id),
                "Report must be a reply to a message",
            )
            .await;
            return ScoringResult::new(0, "report without a target message");
        };

        let mut state = match self.report_state(reported.id).await {
            Ok(Some(state)) => state,
            Ok(None) => ReportState::fresh(),
            Err(e) => {
                tracing::warn!(filter = %self.name, message_id = reported.id, "Report state unreadable, starting fresh: {}", e);
                ReportState::fresh()
            }
        };

        if state.verified {
            send_notice(
                self.platform.as_ref(),
                message.conversation_id,
                Some(message.id),
                "Message/user was already reported",
            )
            .await;
            self.remove_report_message(message).await;
            return ScoringResult::already_handled("already reported");
        }

        self.remove_report_message(message).await;

        tracing::info!(
            filter = %self.name,
            reporter_id = message.sender.id,
            reported_user_id = reported.sender.id,
            message_id = reported.id,
            "Message reported"
        );
        let score = ScoringResult::ban("reported command");
        let ctx = ActionContext {
            score: &score,
            vacations: Some(&self.vacations),
        };
        let report = self
            .pipeline
            .run(
                &ctx,
                ActionTarget {
                    message: reported,
                    message_ids: &[reported.id],
                    user_id: reported.sender.id,
                },
            )
            .await;
        if !report.is_clean() {
            tracing::warn!(filter = %self.name, failed = report.failed.len(), "Some report actions failed");
        }

        state.verified = true;
        state.last_update = Utc::now();
        if let Err(e) = save_json(self.store.as_ref(), &id_to_key(reported.id), &state).await {
            tracing::error!(filter = %self.name, message_id = reported.id, "Failed to save report state: {}", e);
        }

        score
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn is_final(&self) -> bool {
        self.settings.is_final
    }

    async fn load_state(&self) -> Result<(), ModerationError> {
        Ok(())
    }

    async fn remove_state(&self, key: i64) -> Result<(), ModerationError> {
        self.store.delete(&id_to_key(key)).await
    }

    async fn handle_admin_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        self.commands.dispatch(ctx, tokens).await
    }

    async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.shutdown().await;
            tracing::debug!(filter = %self.name, "Report filter stopped");
        }
    }
}
