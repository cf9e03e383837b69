use std::sync::Arc;
use std::time::Duration;

use crate::{AuthError, CorrelationId, KvError, KvStore, StateSecret};

const KEY_PREFIX: &str = "auth:";

/// Single-use `CorrelationId -> StateSecret` pairs for CSRF checks.
#[derive(Debug)]
pub struct StateStore<K> {
    kv: Arc<K>,
    ttl: Duration,
}

impl<K> Clone for StateStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            ttl: self.ttl,
        }
    }
}

impl<K: KvStore> StateStore<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            ttl: Duration::ZERO,
        }
    }

    /// Expire unconsumed entries. Zero keeps them until consumed.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn put(&self, id: &CorrelationId, secret: &StateSecret) -> Result<(), AuthError> {
        self.kv
            .set(&key(id), secret.as_str().to_string(), self.ttl)
            .await?;
        Ok(())
    }

    /// Removes the entry for `id` and checks it against `presented`. The entry
    /// is gone afterwards whether or not the values matched.
    pub async fn consume(&self, id: &CorrelationId, presented: &str) -> Result<(), AuthError> {
        let stored = match self.kv.take(&key(id)).await {
            Ok(value) => StateSecret::from(value),
            Err(KvError::NotFound) => return Err(AuthError::StateMissing),
            Err(err) => return Err(AuthError::Kv(err)),
        };

        if stored.matches(presented) {
            Ok(())
        } else {
            Err(AuthError::StateMismatch)
        }
    }

    pub async fn take_and_verify(
        &self,
        id: &CorrelationId,
        presented: &str,
    ) -> Result<bool, AuthError> {
        match self.consume(id, presented).await {
            Ok(()) => Ok(true),
            Err(AuthError::StateMissing | AuthError::StateMismatch) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn key(id: &CorrelationId) -> String {
    format!("{KEY_PREFIX}{id}")
}
