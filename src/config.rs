use std::net::SocketAddr;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::session::DEFAULT_SESSION_COOKIE;
use crate::token::DEFAULT_STATE_SECRET_BYTES;
use crate::{AuthError, CookiePolicy, ProviderConfig, TwitchProvider};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const MIN_AUTH_SECRET_BYTES: usize = 32;

/// Session and login-flow settings shared by every request.
#[derive(Clone)]
pub struct AuthSettings {
    pub cookie_name: String,
    pub cookie_key: Key,
    pub pending_cookie: CookiePolicy,
    pub session_cookie: CookiePolicy,
    pub logout_cookie: CookiePolicy,
    pub home_path: String,
    pub state_secret_bytes: usize,
    pub state_ttl: Duration,
}

impl AuthSettings {
    pub fn new(cookie_key: Key) -> Self {
        Self {
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            cookie_key,
            pending_cookie: CookiePolicy::pending(),
            session_cookie: CookiePolicy::authenticated(),
            logout_cookie: CookiePolicy::logout(),
            home_path: "/".to_string(),
            state_secret_bytes: DEFAULT_STATE_SECRET_BYTES,
            state_ttl: Duration::ZERO,
        }
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_pending_cookie(mut self, policy: CookiePolicy) -> Self {
        self.pending_cookie = policy;
        self
    }

    pub fn with_session_cookie(mut self, policy: CookiePolicy) -> Self {
        self.session_cookie = policy;
        self
    }

    pub fn with_logout_cookie(mut self, policy: CookiePolicy) -> Self {
        self.logout_cookie = policy;
        self
    }

    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    pub fn with_state_secret_bytes(mut self, bytes: usize) -> Self {
        self.state_secret_bytes = bytes;
        self
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }
}

/// Derives the cookie signing key from an arbitrary-length secret.
pub fn cookie_key_from_secret(secret: &str) -> Result<Key, AuthError> {
    if secret.len() < MIN_AUTH_SECRET_BYTES {
        return Err(AuthError::Config(format!(
            "AUTH_SECRET must be at least {MIN_AUTH_SECRET_BYTES} bytes"
        )));
    }
    let digest = Sha512::digest(secret.as_bytes());
    Ok(Key::from(digest.as_slice()))
}

/// Process configuration, read once before the server starts.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub settings: AuthSettings,
}

impl AppConfig {
    /// Reads the environment, falling back to `.env` when `TWITCH_CLIENT_ID`
    /// is not already set.
    ///
    /// # Required env vars
    /// - `SITE_URL`: public origin; the callback is `${SITE_URL}/api/auth/callback`
    /// - `TWITCH_CLIENT_ID`, `TWITCH_CLIENT_SECRET`
    /// - `AUTH_SECRET`: at least 32 bytes, signs the session cookie
    ///
    /// # Optional env vars
    /// - `BIND_ADDR` (default `0.0.0.0:3000`)
    /// - `AUTH_STATE_TTL_SECS`: expire unconsumed login state
    /// - `SECURE_COOKIES`: `1`/`true` marks the session cookie `Secure`
    pub fn load() -> Result<Self, AuthError> {
        if std::env::var("TWITCH_CLIENT_ID").is_err() {
            dotenvy::from_filename(".env")
                .map_err(|err| AuthError::Config(format!("failed to load .env: {err}")))?;
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AuthError::Config(format!("{name} is required")))
        };

        let site_url = required("SITE_URL")?;
        url::Url::parse(&site_url).map_err(|err| AuthError::Config(format!("SITE_URL: {err}")))?;

        let provider = ProviderConfig::new(
            required("TWITCH_CLIENT_ID")?,
            required("TWITCH_CLIENT_SECRET")?,
            TwitchProvider::redirect_uri_for(&site_url),
        );

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|err| AuthError::Config(format!("BIND_ADDR: {err}")))?;

        let mut settings = AuthSettings::new(cookie_key_from_secret(&required("AUTH_SECRET")?)?);

        if let Some(secs) = lookup("AUTH_STATE_TTL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|err| AuthError::Config(format!("AUTH_STATE_TTL_SECS: {err}")))?;
            settings = settings.with_state_ttl(Duration::from_secs(secs));
        }

        if matches!(lookup("SECURE_COOKIES").as_deref(), Some("1") | Some("true")) {
            settings.pending_cookie = settings.pending_cookie.with_secure(true);
            settings.session_cookie = settings.session_cookie.with_secure(true);
            settings.logout_cookie = settings.logout_cookie.with_secure(true);
        }

        Ok(Self {
            bind_addr,
            provider,
            settings,
        })
    }
}
