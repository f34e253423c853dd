// Namespaced key/value storage port plus the key codec shared by all filters.
//
// Each component opens its own namespace ("banned_db", "<filter>_state",
// "<rule>_config", ...). Keys for user and message ids use the zig-zag
// signed varint encoding so existing databases stay readable.

use super::moderation_models::ModerationError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Longest valid encoding of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ModerationError>;

    /// Insert or overwrite.
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), ModerationError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &[u8]) -> Result<(), ModerationError>;

    async fn keys(&self) -> Result<Vec<Vec<u8>>, ModerationError>;
}

/// Hands out stores by namespace. Opening the same namespace twice yields
/// views over the same data.
pub trait StoreProvider: Send + Sync {
    fn open(&self, namespace: &str) -> Arc<dyn KvStore>;
}

// ============================================================================
// KEY CODEC
// ============================================================================

/// Encode an id as a zig-zag signed varint.
pub fn id_to_key(id: i64) -> Vec<u8> {
    let mut value = ((id << 1) ^ (id >> 63)) as u64;
    let mut out = Vec::with_capacity(MAX_VARINT_LEN);
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out
}

/// Decode a key written by `id_to_key`.
///
/// Empty, truncated, overlong and trailing-garbage keys are rejected
/// instead of decoding to 0.
pub fn key_to_id(key: &[u8]) -> Result<i64, ModerationError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in key.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(ModerationError::InvalidKey);
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(ModerationError::InvalidKey);
            }
            if i + 1 != key.len() {
                return Err(ModerationError::InvalidKey);
            }
            value |= (byte as u64) << shift;
            let decoded = (value >> 1) as i64;
            return Ok(if value & 1 != 0 { !decoded } else { decoded });
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(ModerationError::InvalidKey)
}

// ============================================================================
// JSON RECORDS
// ============================================================================

/// Read and decode a JSON record. A record that does not decode is a
/// storage error, same as a failed read.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &[u8],
) -> Result<Option<T>, ModerationError> {
    match store.get(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ModerationError::StorageError(format!("undecodable record: {}", e))),
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + Sync>(
    store: &dyn KvStore,
    key: &[u8],
    value: &T,
) -> Result<(), ModerationError> {
    let bytes =
        serde_json::to_vec(value).map_err(|e| ModerationError::StorageError(e.to_string()))?;
    store.set(key, &bytes).await
}
