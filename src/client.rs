use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::{AuthError, IdentityClient, StateSecret, TokenResponse, TwitchProvider};

/// Registered application credentials. Built once at startup and shared
/// read-only between requests.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec![TwitchProvider::default_scope().to_string()],
            timeout: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: TwitchProvider,
    config: Arc<ProviderConfig>,
    http: Client,
}

impl OAuthClient {
    pub fn new(provider: TwitchProvider, config: Arc<ProviderConfig>) -> Result<Self, AuthError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            provider,
            config,
            http,
        })
    }

    pub fn with_http_client(
        provider: TwitchProvider,
        config: Arc<ProviderConfig>,
        http: Client,
    ) -> Self {
        Self {
            provider,
            config,
            http,
        }
    }

    pub fn provider(&self) -> &TwitchProvider {
        &self.provider
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Client for the user-info endpoint sharing this client's connection pool.
    pub fn identity(&self) -> IdentityClient {
        IdentityClient::new(
            self.provider.users_url(),
            self.config.client_id.clone(),
            self.http.clone(),
        )
    }

    pub fn authorization_url(&self, state: &StateSecret) -> Result<Url, AuthError> {
        let mut url = Url::parse(self.provider.authorize_url())?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state.as_str());
        Ok(url)
    }

    /// Trades an authorization code for tokens. Codes are single use, so a
    /// failure is never retried.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let payload = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(self.provider.token_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&payload)
            .send()
            .await
            .map_err(exchange_failed)?;

        let status = response.status();
        let body = response.text().await.map_err(exchange_failed)?;

        if !status.is_success() {
            return Err(AuthError::CodeExchangeFailed {
                message: format!("http status {}", status.as_u16()),
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|err| AuthError::CodeExchangeFailed {
                message: format!("invalid token response: {err}"),
            })?;

        if token.access_token.secret().is_empty() {
            return Err(AuthError::CodeExchangeFailed {
                message: "token response is missing access_token".to_string(),
            });
        }

        Ok(token)
    }
}

fn exchange_failed(err: reqwest::Error) -> AuthError {
    AuthError::CodeExchangeFailed {
        message: err.to_string(),
    }
}
