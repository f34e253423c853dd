// Admin vacation list - admins on vacation are not pinged by report notices.
//
// Entries expire on their own: a background sweep removes them once their
// end time has passed. The sweep is stopped through a watch channel and
// joined on shutdown.

use super::command_router::{AdminCommandHandler, CommandContext};
use super::moderation_models::ModerationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

pub const VACATION_PREFIX: &str = "vacation";

const HELP: &str = "Supported commands:\n\
   list - show admins on vacation\n\
   add <admin> <duration> - e.g. `add alice 72h`\n\
   remove <admin> - end a vacation early";

#[derive(Default)]
pub struct VacationList {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl VacationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an admin on vacation. Re-adding replaces the end time.
    pub async fn add(
        &self,
        admin: &str,
        duration: Duration,
    ) -> Result<DateTime<Utc>, ModerationError> {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|_| ModerationError::InvalidCommand("vacation is too long".to_string()))?;
        let until = Utc::now()
            .checked_add_signed(duration)
            .ok_or_else(|| ModerationError::InvalidCommand("vacation is too long".to_string()))?;
        self.entries.write().await.insert(normalize(admin), until);
        Ok(until)
    }

    /// Returns `false` if the admin was not on vacation.
    pub async fn remove(&self, admin: &str) -> bool {
        self.entries.write().await.remove(&normalize(admin)).is_some()
    }

    pub async fn is_on_vacation(&self, admin: &str) -> bool {
        self.entries.read().await.contains_key(&normalize(admin))
    }

    /// Snapshot sorted by admin name.
    pub async fn list(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(admin, until)| (admin.clone(), *until))
            .collect();
        entries.sort();
        entries
    }

    /// Drop entries that ended at or before `now`. Returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, until| *until > now);
        before - entries.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let list = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = list.sweep_expired(Utc::now()).await;
                        if removed > 0 {
                            tracing::info!(removed, "Expired admin vacations removed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Vacation sweeper stopped");
        });

        SweepHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Stops and joins a running vacation sweep.
pub struct SweepHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Vacation sweeper did not stop cleanly: {}", e);
        }
    }
}

fn normalize(admin: &str) -> String {
    admin.trim_start_matches('@').to_lowercase()
}

#[async_trait]
impl AdminCommandHandler for VacationList {
    async fn handle_command(
        &self,
        ctx: &CommandContext,
        tokens: &[String],
    ) -> Result<(), ModerationError> {
        let command = tokens.first().map(|t| t.to_lowercase());

        match command.as_deref() {
            None | Some("list") => {
                let entries = self.list().await;
                let text = if entries.is_empty() {
                    "Nobody is on vacation".to_string()
                } else {
                    let lines: Vec<String> = entries
                        .iter()
                        .map(|(admin, until)| {
                            format!("{} until {}", admin, until.format("%Y-%m-%d %H:%M UTC"))
                        })
                        .collect();
                    lines.join("\n")
                };
                ctx.reply(&text).await
            }
            Some("add") => {
                let (Some(admin), Some(raw_duration)) = (tokens.get(1), tokens.get(2)) else {
                    ctx.notify(HELP).await;
                    return Err(ModerationError::InvalidCommand(
                        "vacation add needs an admin and a duration".to_string(),
                    ));
                };
                let duration = match humantime::parse_duration(raw_duration) {
                    Ok(d) => d,
                    Err(e) => {
                        ctx.notify(&format!("Invalid duration `{}`: {}", raw_duration, e))
                            .await;
                        return Err(ModerationError::InvalidCommand(e.to_string()));
                    }
                };
                let until = match self.add(admin, duration).await {
                    Ok(until) => until,
                    Err(e) => {
                        ctx.notify(&format!("cannot add vacation: {}", e)).await;
                        return Err(e);
                    }
                };
                ctx.reply(&format!(
                    "{} is on vacation until {}",
                    normalize(admin),
                    until.format("%Y-%m-%d %H:%M UTC")
                ))
                .await
            }
            Some("remove") => {
                let Some(admin) = tokens.get(1) else {
                    ctx.notify(HELP).await;
                    return Err(ModerationError::InvalidCommand(
                        "vacation remove needs an admin".to_string(),
                    ));
                };
                if self.remove(admin).await {
                    ctx.reply(&format!("Welcome back, {}", normalize(admin)))
                        .await
                } else {
                    ctx.reply(&format!("{} is not on vacation", normalize(admin)))
                        .await
                }
            }
            Some("help") => ctx.reply(HELP).await,
            Some(other) => {
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
    use crate::core::moderation::test_support::MockPlatform;

    #[tokio::test]
    async fn test_add_and_remove() {
        let list = VacationList::new();
        list.add("@Alice", Duration::from_secs(3600)).await.unwrap();

        assert!(list.is_on_vacation("alice").await);
        assert!(list.remove("ALICE").await);
        assert!(!list.remove("alice").await);
        assert!(!list.is_on_vacation("alice").await);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let list = VacationList::new();
        list.add("short", Duration::from_secs(60)).await.unwrap();
        list.add("long", Duration::from_secs(7200)).await.unwrap();

        let removed = list
            .sweep_expired(Utc::now() + chrono::Duration::minutes(5))
            .await;

        assert_eq!(removed, 1);
        assert!(!list.is_on_vacation("short").await);
        assert!(list.is_on_vacation("long").await);
    }

    #[tokio::test]
    async fn test_sweeper_expires_entries_and_shuts_down() {
        let list = Arc::new(VacationList::new());
        list.add("bob", Duration::from_millis(20)).await.unwrap();

        let handle = list.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!list.is_on_vacation("bob").await);

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("sweeper should stop promptly");
    }

    #[tokio::test]
    async fn test_add_command_parses_duration() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let list = VacationList::new();

        list.handle_command(&ctx, &tokenize("add carol 72h"))
            .await
            .unwrap();

        assert!(list.is_on_vacation("carol").await);
        assert!(platform.sent_texts()[0].starts_with("carol is on vacation until "));
    }

    #[tokio::test]
    async fn test_add_command_rejects_bad_duration() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let list = VacationList::new();

        let result = list.handle_command(&ctx, &tokenize("add carol soon")).await;

        assert!(matches!(result, Err(ModerationError::InvalidCommand(_))));
        assert!(!list.is_on_vacation("carol").await);
    }

    #[tokio::test]
    async fn test_add_command_reports_overlong_vacation() {
        let platform = MockPlatform::new();
        let ctx = platform.command_context(-100);
        let list = VacationList::new();

        let result = list
            .handle_command(&ctx, &tokenize("add carol 500000000y"))
            .await;

        assert!(matches!(result, Err(ModerationError::InvalidCommand(_))));
        assert_eq!(platform.sent_texts().len(), 1);
        assert!(platform.sent_texts()[0].starts_with("cannot add vacation: "));
    }
}
