use std::fmt;

use rand::{TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::AuthError;

pub const DEFAULT_STATE_SECRET_BYTES: usize = 8;

/// Identifies one pending login attempt. Stored in the session cookie and used
/// as the state-store key; never sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Random v4 UUID, so ids cannot be predicted and pre-seeded for a victim.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded random value sent to the provider as the OAuth `state`.
#[derive(Clone, PartialEq, Eq)]
pub struct StateSecret(String);

impl StateSecret {
    pub fn generate(byte_len: usize) -> Result<Self, AuthError> {
        Self::generate_with(&mut OsRng, byte_len)
    }

    pub fn generate_with<R: TryRngCore>(rng: &mut R, byte_len: usize) -> Result<Self, AuthError> {
        let mut bytes = vec![0u8; byte_len];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|err| AuthError::EntropyUnavailable {
                message: err.to_string(),
            })?;
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl From<String> for StateSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for StateSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateSecret(..)")
    }
}
