// SQLite-backed key/value store for moderation state.
//
// Tables:
// - kv_store: one row per (namespace, key); values are opaque blobs
//
// Every namespace (banned registry, per-filter state, per-rule config)
// shares the same pool and table.

use crate::core::moderation::{KvStore, ModerationError, StoreProvider};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::sync::Arc;

pub struct SqliteStoreProvider {
    pool: Pool<Sqlite>,
}

impl SqliteStoreProvider {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await?;

        let provider = Self { pool };
        provider.migrate().await?;
        Ok(provider)
    }

    async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                namespace TEXT NOT NULL,
                key BLOB NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

impl StoreProvider for SqliteStoreProvider {
    fn open(&self, namespace: &str) -> Arc<dyn KvStore> {
        Arc::new(SqliteKvStore {
            pool: self.pool.clone(),
            namespace: namespace.to_string(),
        })
    }
}

/// One namespace of the shared table.
pub struct SqliteKvStore {
    pool: Pool<Sqlite>,
    namespace: String,
}

fn storage_error(e: sqlx::Error) -> ModerationError {
    ModerationError::StorageError(e.to_string())
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ModerationError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE namespace = ? AND key = ?")
            .bind(self.namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value)
            VALUES (?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), ModerationError> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = ? AND key = ?")
            .bind(self.namespace.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Vec<u8>>, ModerationError> {
        let rows = sqlx::query("SELECT key FROM kv_store WHERE namespace = ? ORDER BY key")
            .bind(self.namespace.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows.iter().map(|r| r.get::<Vec<u8>, _>("key")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::banned_registry::{BannedRegistry, BANNED_NAMESPACE};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_sqlite_persistence_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let provider = SqliteStoreProvider::connect(&path).await.unwrap();
        let store = provider.open("spam_state");
        store.set(b"k1", b"first").await.unwrap();
        store.set(b"k1", b"second").await.unwrap();
        store.set(b"k2", b"other").await.unwrap();
        store.delete(b"k2").await.unwrap();

        // Reopen from file
        let reopened = SqliteStoreProvider::connect(&path).await.unwrap();
        let store = reopened.open("spam_state");
        assert_eq!(store.get(b"k1").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.get(b"k2").await.unwrap(), None);
        assert_eq!(store.keys().await.unwrap(), vec![b"k1".to_vec()]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let provider = SqliteStoreProvider::connect(&path).await.unwrap();
        provider.open("a").set(b"key", b"1").await.unwrap();

        assert_eq!(provider.open("b").get(b"key").await.unwrap(), None);
        assert!(provider.open("b").keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_banned_registry_survives_restart() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let provider = SqliteStoreProvider::connect(&path).await.unwrap();
        BannedRegistry::new(provider.open(BANNED_NAMESPACE))
            .ban(-1001234567890)
            .await
            .unwrap();

        let reopened = SqliteStoreProvider::connect(&path).await.unwrap();
        let registry = BannedRegistry::new(reopened.open(BANNED_NAMESPACE));
        assert!(registry.is_banned(-1001234567890).await);
        assert_eq!(registry.list_banned().await.unwrap(), vec![-1001234567890]);
    }
}
