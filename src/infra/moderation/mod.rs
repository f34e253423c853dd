// Implementations for the moderation engine.

pub mod config_file;
pub mod in_memory_kv_store;
pub mod sqlite_kv_store;

// Re-export for convenience
pub use in_memory_kv_store::{InMemoryKvStore, InMemoryStoreProvider};
pub use sqlite_kv_store::SqliteStoreProvider;
