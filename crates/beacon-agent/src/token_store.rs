//! # Token Store
//!
//! Durable copy of the OAuth token pair.
//!
//! `load` fails open: a missing, unreadable or malformed value yields the
//! caller's default pair. `save` failures are returned for logging only;
//! the in-memory pair held by the authority stays valid either way.

use async_trait::async_trait;
use beacon_core::TokenPair;
use beacon_db::KeyValueRepository;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StorageError;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the stored pair, or `default` when none is usable.
    async fn load(&self, default: TokenPair) -> TokenPair;

    async fn save(&self, pair: &TokenPair) -> Result<(), StorageError>;
}

/// Parses a stored value, falling back to `default`.
fn decode_or(raw: Option<String>, default: TokenPair, key: &str) -> TokenPair {
    let Some(raw) = raw else {
        debug!(key = %key, "No stored token pair, using bootstrap pair");
        return default;
    };

    match serde_json::from_str::<TokenPair>(&raw) {
        Ok(pair) if pair.is_complete() => {
            info!(key = %key, updated_at = %pair.updated_at, "Loaded stored token pair");
            pair
        }
        Ok(_) => {
            warn!(key = %key, "Stored token pair is incomplete, using bootstrap pair");
            default
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Stored token pair is malformed, using bootstrap pair");
            default
        }
    }
}

// =============================================================================
// SQLite-backed Store
// =============================================================================

/// Token store over the `kv_store` table.
#[derive(Debug, Clone)]
pub struct DbTokenStore {
    kv: KeyValueRepository,
    key: String,
}

impl DbTokenStore {
    pub fn new(kv: KeyValueRepository, key: impl Into<String>) -> Self {
        DbTokenStore {
            kv,
            key: key.into(),
        }
    }
}

#[async_trait]
impl TokenStore for DbTokenStore {
    async fn load(&self, default: TokenPair) -> TokenPair {
        match self.kv.get(&self.key).await {
            Ok(raw) => decode_or(raw, default, &self.key),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Token store read failed, using bootstrap pair");
                default
            }
        }
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), StorageError> {
        let raw = serde_json::to_string(pair)?;
        self.kv.set(&self.key, &raw).await?;
        debug!(key = %self.key, "Token pair persisted");
        Ok(())
    }
}

// =============================================================================
// In-memory Store
// =============================================================================

/// Process-local store, for tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    raw: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an already-serialized value, as if written earlier.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        MemoryTokenStore {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub async fn raw(&self) -> Option<String> {
        self.raw.lock().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, default: TokenPair) -> TokenPair {
        decode_or(self.raw.lock().await.clone(), default, "memory")
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), StorageError> {
        *self.raw.lock().await = Some(serde_json::to_string(pair)?);
        Ok(())
    }
}
