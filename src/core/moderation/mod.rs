// Core moderation module - the anti-spam scoring and moderation engine.
//
// Leaves first: models, ports (platform, storage), then the components
// built on them, then the engine that ties them together.

pub mod action_pipeline;
pub mod actions;
pub mod banned_registry;
pub mod check_n_events;
pub mod command_router;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderation_service;
pub mod platform;
pub mod registry;
pub mod report_filter;
pub mod rules;
pub mod scoring_chain;
pub mod state_store;
pub mod stateful_filter;
pub mod vacations;

#[cfg(test)]
pub mod test_support;

pub use command_router::CommandContext;
pub use moderation_config::ModerationConfig;
pub use moderation_models::*;
pub use moderation_service::ModerationEngine;
pub use platform::{ChatPlatform, PlatformError};
pub use registry::Registry;
pub use state_store::{KvStore, StoreProvider};
