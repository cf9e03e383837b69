use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{AuthError, CorrelationId};

pub const DEFAULT_SESSION_COOKIE: &str = "session";

// Browsers drop cookies larger than this; the signature adds a fixed prefix.
const MAX_COOKIE_BYTES: usize = 4096;
const SIGNATURE_BYTES: usize = 44;

/// Session fields carried in the signed cookie.
///
/// A record is either pending (`auth_state` set during login) or
/// authenticated (`user_id` set after the callback), never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_state: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

impl SessionRecord {
    pub fn pending(&self) -> Option<&CorrelationId> {
        self.auth_state.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

/// Attributes applied to the session cookie when it is written.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub path: String,
    pub max_age: Duration,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl CookiePolicy {
    /// Used while a login is in flight.
    pub fn pending() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Duration::days(7),
            http_only: true,
            secure: false,
            same_site: None,
        }
    }

    /// Used once the user is signed in.
    pub fn authenticated() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Duration::days(30),
            http_only: true,
            secure: false,
            same_site: None,
        }
    }

    /// Used on logout.
    pub fn logout() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Duration::hours(1),
            http_only: true,
            secure: false,
            same_site: Some(SameSite::Strict),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// A request's session: the decoded record plus the jar it is written back to.
#[derive(Debug, Clone)]
pub struct Session {
    jar: SignedCookieJar,
    record: SessionRecord,
}

impl Session {
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn is_authenticated(&self) -> bool {
        self.record.is_authenticated()
    }

    pub fn into_jar(self) -> SignedCookieJar {
        self.jar
    }
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    cookie_name: String,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_COOKIE)
    }
}

impl SessionManager {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Never fails: a missing, tampered or undecodable cookie yields an empty record.
    pub fn get(&self, jar: SignedCookieJar) -> Session {
        let record = jar
            .get(&self.cookie_name)
            .and_then(|cookie| decode(cookie.value()))
            .unwrap_or_default();
        Session { jar, record }
    }

    pub fn set_pending(
        &self,
        session: &mut Session,
        id: CorrelationId,
        policy: &CookiePolicy,
    ) -> Result<(), AuthError> {
        session.record.auth_state = Some(id);
        session.record.user_id = None;
        self.persist(session, policy)
    }

    /// Removes the pending correlation id and writes the cleared record back,
    /// so a failed callback cannot be replayed with the same cookie.
    pub fn take_pending(
        &self,
        session: &mut Session,
        policy: &CookiePolicy,
    ) -> Result<Option<CorrelationId>, AuthError> {
        let Some(id) = session.record.auth_state.take() else {
            return Ok(None);
        };
        self.persist(session, policy)?;
        Ok(Some(id))
    }

    pub fn authenticate(
        &self,
        session: &mut Session,
        user_id: &str,
        policy: &CookiePolicy,
    ) -> Result<(), AuthError> {
        session.record.auth_state = None;
        session.record.user_id = Some(user_id.to_string());
        self.persist(session, policy)
    }

    pub fn clear(&self, session: &mut Session, policy: &CookiePolicy) -> Result<(), AuthError> {
        session.record.user_id = None;
        self.persist(session, policy)
    }

    fn persist(&self, session: &mut Session, policy: &CookiePolicy) -> Result<(), AuthError> {
        let value = encode(&session.record)?;
        if self.cookie_name.len() + value.len() + SIGNATURE_BYTES > MAX_COOKIE_BYTES {
            return Err(AuthError::SessionPersistFailed {
                message: format!("session cookie exceeds {MAX_COOKIE_BYTES} bytes"),
            });
        }

        let mut cookie = Cookie::build((self.cookie_name.clone(), value))
            .path(policy.path.clone())
            .max_age(policy.max_age)
            .http_only(policy.http_only)
            .secure(policy.secure)
            .build();
        if let Some(same_site) = policy.same_site {
            cookie.set_same_site(same_site);
        }

        session.jar = session.jar.clone().add(cookie);
        Ok(())
    }
}

fn encode(record: &SessionRecord) -> Result<String, AuthError> {
    let json = serde_json::to_vec(record).map_err(|err| AuthError::SessionPersistFailed {
        message: err.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode(value: &str) -> Option<SessionRecord> {
    let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::debug!(error = %err, "discarding undecodable session cookie");
            None
        }
    }
}
