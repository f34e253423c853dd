// Admin slash command - the same routing as `/admin ...` text messages.

use crate::core::moderation::command_router::tokenize;
use crate::discord::{Context, Error};

/// Run a moderation admin command.
///
/// Examples: `bandb list`, `spam words add casino`, `reports vacation add alice 72h`.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn admin(
    ctx: Context<'_>,
    #[description = "Command, e.g. `bandb list` or `help`"] command: String,
) -> Result<(), Error> {
    let engine = &ctx.data().engine;
    let conversation_id = ctx.channel_id().get() as i64;
    let issuer_id = ctx.author().id.get() as i64;

    if !engine.is_authorized(conversation_id, issuer_id).await {
        ctx.say("❌ You are not allowed to run moderation commands.")
            .await?;
        return Ok(());
    }

    ctx.defer().await?;

    // Replies from handlers go to the channel; the interaction gets a summary.
    let command_ctx = engine.command_context(conversation_id, None, issuer_id);
    match engine.dispatch_admin(&command_ctx, &tokenize(&command)).await {
        Ok(()) => {
            ctx.say("✅ Done.").await?;
        }
        Err(e) => {
            tracing::warn!(issuer_id, "Admin slash command failed: {}", e);
            ctx.say(format!("❌ {}", e)).await?;
        }
    }

    Ok(())
}
