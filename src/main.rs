// This is the entry point of the anti-spam bot.
//
// **Architecture Overview:**
// - `core/` = Moderation engine (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory, config file)
// - `discord/` = Discord-specific adapters (platform, message conversion, commands)
//
// This file's job is to:
// 1. Load configuration
// 2. Build the moderation engine (dependency injection)
// 3. Set up the Discord framework
// 4. Route gateway messages into the engine and shut it down cleanly

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{ModerationEngine, Registry};
use crate::discord::moderation::platform::SerenityPlatform;
use crate::discord::moderation::spam_handler;
use crate::discord::{Data, Error};
use crate::infra::moderation::config_file::load_config;
use crate::infra::moderation::SqliteStoreProvider;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "antispam.yaml";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PLATFORM_TIMEOUT_SECS: u64 = 10;

/// Event handler for non-command Discord events.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        // Ignore bot messages (including our own)
        if new_message.author.bot {
            return Ok(());
        }
        spam_handler::handle_message_for_spam(new_message, data).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );
    let config_path =
        std::env::var("ANTISPAM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let data_dir =
        std::env::var("ANTISPAM_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let platform_timeout = std::env::var("ANTISPAM_PLATFORM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_PLATFORM_TIMEOUT_SECS);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let config = load_config(&config_path)
        .await
        .expect("Failed to load moderation config");

    let stores = SqliteStoreProvider::connect(format!("{}/antispam.db", data_dir))
        .await
        .expect("Failed to initialize SQLite store");

    let http = Arc::new(serenity::Http::new(&token));
    let platform = Arc::new(SerenityPlatform::new(
        Arc::clone(&http),
        Duration::from_secs(platform_timeout),
    ));

    let engine = Arc::new(
        ModerationEngine::from_config(
            &config,
            &Registry::with_builtins(),
            platform,
            Arc::new(stores),
        )
        .await
        .expect("Failed to build moderation engine"),
    );

    let data = Data {
        engine: Arc::clone(&engine),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::moderation::commands::admin()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .expect("Failed to create client");

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Client error: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    engine.shutdown().await;
    shard_manager.shutdown_all().await;
}
