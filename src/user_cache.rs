use std::sync::Arc;
use std::time::Duration;

use crate::{AuthError, KvError, KvStore, UserProfile};

const KEY_PREFIX: &str = "user:";

/// Profiles keyed by provider user id. Entries never expire; the latest login
/// overwrites the previous snapshot.
#[derive(Debug)]
pub struct UserCache<K> {
    kv: Arc<K>,
}

impl<K> Clone for UserCache<K> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<K: KvStore> UserCache<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    pub async fn put(&self, profile: &UserProfile) -> Result<(), AuthError> {
        let value = serde_json::to_string(profile)
            .map_err(|err| AuthError::CacheWriteFailed(KvError::Backend(err.to_string())))?;
        self.kv
            .set(&key(&profile.id), value, Duration::ZERO)
            .await
            .map_err(AuthError::CacheWriteFailed)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, AuthError> {
        let value = match self.kv.get(&key(user_id)).await {
            Ok(value) => value,
            Err(KvError::NotFound) => return Ok(None),
            Err(err) => return Err(AuthError::Kv(err)),
        };

        serde_json::from_str(&value)
            .map(Some)
            .map_err(|err| AuthError::ProfileDecodeFailed {
                message: err.to_string(),
            })
    }
}

fn key(user_id: &str) -> String {
    format!("{KEY_PREFIX}{user_id}")
}
