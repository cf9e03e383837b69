use crate::server::CALLBACK_PATH;

const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const USERS_URL: &str = "https://api.twitch.tv/helix/users";

const DEFAULT_SCOPE: &str = "user:read:email";

/// Twitch endpoints. Overridable so a mock server can stand in for the provider.
#[derive(Debug, Clone)]
pub struct TwitchProvider {
    authorize_url: String,
    token_url: String,
    users_url: String,
}

impl Default for TwitchProvider {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            users_url: USERS_URL.to_string(),
        }
    }
}

impl TwitchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_users_url(mut self, url: impl Into<String>) -> Self {
        self.users_url = url.into();
        self
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn users_url(&self) -> &str {
        &self.users_url
    }

    pub fn default_scope() -> &'static str {
        DEFAULT_SCOPE
    }

    /// Redirect URI registered with Twitch for a site root such as
    /// `https://example.com`.
    pub fn redirect_uri_for(site_url: &str) -> String {
        format!("{}{CALLBACK_PATH}", site_url.trim_end_matches('/'))
    }
}
