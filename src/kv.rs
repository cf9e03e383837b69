use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    #[error("key not found")]
    NotFound,

    #[error("kv backend error: {0}")]
    Backend(String),
}

/// Key/value backend shared by the state store and the user cache.
///
/// A `ttl` of [`Duration::ZERO`] means the value never expires.
pub trait KvStore: Send + Sync + 'static {
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<String, KvError>> + Send;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Read and remove a value. Backends with an atomic get-and-delete
    /// should override this.
    fn take(&self, key: &str) -> impl Future<Output = Result<String, KvError>> + Send {
        async move {
            let value = self.get(key).await?;
            self.delete(key).await?;
            Ok(value)
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`KvStore`]. Expired entries are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String, KvError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(KvError::NotFound)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<String, KvError> {
        let entry = self
            .entries
            .lock()
            .await
            .remove(key)
            .ok_or(KvError::NotFound)?;
        if entry.is_expired(Instant::now()) {
            return Err(KvError::NotFound);
        }
        Ok(entry.value)
    }
}
