//! Login / callback / logout orchestration.
//!
//! A login binds a fresh [`CorrelationId`] to the session cookie and stores a
//! [`StateSecret`] under that id. The secret travels to Twitch as the OAuth
//! `state` and must come back unchanged on the callback, where the stored
//! entry is consumed whether or not it matches.

use std::sync::Arc;

use url::Url;

use crate::{
    AuthError, AuthSettings, CallbackParams, CorrelationId, IdentityClient, KvStore, OAuthClient,
    ProviderConfig, Session, SessionManager, StateSecret, StateStore, TwitchProvider, UserCache,
    UserProfile,
};

pub struct Authenticator<K> {
    oauth: OAuthClient,
    identity: IdentityClient,
    states: StateStore<K>,
    users: UserCache<K>,
    sessions: SessionManager,
    settings: AuthSettings,
}

impl<K: KvStore> Authenticator<K> {
    pub fn new(
        provider: TwitchProvider,
        config: Arc<ProviderConfig>,
        settings: AuthSettings,
        kv: Arc<K>,
    ) -> Result<Self, AuthError> {
        let oauth = OAuthClient::new(provider, config)?;
        Ok(Self::from_client(oauth, settings, kv))
    }

    pub fn from_client(oauth: OAuthClient, settings: AuthSettings, kv: Arc<K>) -> Self {
        Self {
            identity: oauth.identity(),
            oauth,
            states: StateStore::new(kv.clone()).with_ttl(settings.state_ttl),
            users: UserCache::new(kv),
            sessions: SessionManager::new(settings.cookie_name.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn users(&self) -> &UserCache<K> {
        &self.users
    }

    /// Starts a login and returns the provider URL to redirect to.
    pub async fn begin_login(&self, session: &mut Session) -> Result<Url, AuthError> {
        let id = CorrelationId::generate();
        let secret = StateSecret::generate(self.settings.state_secret_bytes)?;

        self.sessions
            .set_pending(session, id.clone(), &self.settings.pending_cookie)?;
        self.states.put(&id, &secret).await?;

        tracing::info!(correlation_id = %id, "login started");
        self.oauth.authorization_url(&secret)
    }

    /// Handles the provider redirect. On success the session is authenticated
    /// and the profile cached; on failure the pending state has already been
    /// removed from both the session and the state store.
    pub async fn complete_login(
        &self,
        session: &mut Session,
        params: CallbackParams,
    ) -> Result<UserProfile, AuthError> {
        let id = self
            .sessions
            .take_pending(session, &self.settings.session_cookie)?
            .ok_or(AuthError::NoSessionState)?;

        let presented = params.state.as_deref().unwrap_or_default();
        self.states.consume(&id, presented).await?;
        tracing::debug!(correlation_id = %id, "login state validated");

        if let Some(error) = params.error {
            tracing::info!(
                correlation_id = %id,
                error = %error,
                description = params.error_description.as_deref().unwrap_or_default(),
                "provider denied authorization"
            );
            return Err(AuthError::AuthorizationDenied { error });
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::CodeExchangeFailed {
                message: "missing authorization code".to_string(),
            })?;

        let token = self.oauth.exchange_code(&code).await?;
        let profile = self.identity.fetch_profile(&token.access_token).await?;

        self.users.put(&profile).await?;
        self.sessions
            .authenticate(session, &profile.id, &self.settings.session_cookie)?;

        tracing::info!(user_id = %profile.id, login = %profile.login, "login succeeded");
        Ok(profile)
    }

    pub fn logout(&self, session: &mut Session) -> Result<(), AuthError> {
        let user_id = session.record().user_id().map(str::to_string);
        self.sessions.clear(session, &self.settings.logout_cookie)?;
        tracing::info!(user_id = user_id.as_deref().unwrap_or_default(), "logged out");
        Ok(())
    }

    /// Cached profile for the session's user, if signed in.
    pub async fn current_user(&self, session: &Session) -> Result<Option<UserProfile>, AuthError> {
        match session.record().user_id() {
            Some(user_id) => self.users.get(user_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_extra::extract::SignedCookieJar;
    use axum_extra::extract::cookie::Key;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{KvError, MemoryKv};

    const PROFILE: &str = r#"{"data":[{
        "id":"42",
        "login":"viewer",
        "display_name":"Viewer",
        "type":"",
        "email":"v@example.com",
        "created_at":"2021-05-01T12:00:00Z"
    }]}"#;

    /// [`MemoryKv`] that fails selected operations for keys under a prefix.
    /// Keeps the trait's default get-then-delete `take`.
    #[derive(Default)]
    struct FailingKv {
        inner: MemoryKv,
        fail_set: Option<&'static str>,
        fail_get: Option<&'static str>,
        fail_delete: Option<&'static str>,
    }

    impl FailingKv {
        fn check(prefix: Option<&str>, key: &str) -> Result<(), KvError> {
            match prefix {
                Some(prefix) if key.starts_with(prefix) => {
                    Err(KvError::Backend("connection reset by peer".to_string()))
                }
                _ => Ok(()),
            }
        }
    }

    impl KvStore for FailingKv {
        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
            Self::check(self.fail_set, key)?;
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<String, KvError> {
            Self::check(self.fail_get, key)?;
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), KvError> {
            Self::check(self.fail_delete, key)?;
            self.inner.delete(key).await
        }
    }

    struct Harness<K = MemoryKv> {
        auth: Authenticator<K>,
        kv: Arc<K>,
        server: MockServer,
    }

    impl Harness {
        async fn new(users_body: &str) -> Self {
            Self::with_kv(users_body, Arc::new(MemoryKv::new())).await
        }
    }

    impl<K: KvStore> Harness<K> {
        async fn with_kv(users_body: &str, kv: Arc<K>) -> Self {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/oauth2/token"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"access_token": "tok"})),
                )
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/helix/users"))
                .respond_with(ResponseTemplate::new(200).set_body_string(users_body))
                .mount(&server)
                .await;

            let provider = TwitchProvider::new()
                .with_token_url(format!("{}/oauth2/token", server.uri()))
                .with_users_url(format!("{}/helix/users", server.uri()));
            let config = Arc::new(ProviderConfig::new(
                "cid",
                "csecret",
                "http://localhost/api/auth/callback",
            ));
            let auth = Authenticator::new(
                provider,
                config,
                AuthSettings::new(Key::generate()),
                kv.clone(),
            )
            .unwrap();
            Self { auth, kv, server }
        }

        fn session(&self) -> Session {
            self.auth
                .sessions()
                .get(SignedCookieJar::new(self.auth.settings().cookie_key.clone()))
        }
    }

    fn state_of(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..CallbackParams::default()
        }
    }

    #[tokio::test]
    async fn full_login_authenticates_and_caches() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();

        let url = h.auth.begin_login(&mut session).await.unwrap();
        assert!(session.record().pending().is_some());

        let profile = h
            .auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap();

        assert_eq!(profile.id, "42");
        assert!(session.is_authenticated());
        assert_eq!(session.record().pending(), None);
        assert_eq!(h.auth.users().get("42").await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn callback_without_pending_state() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let result = h
            .auth
            .complete_login(&mut session, callback("code", "whatever"))
            .await;
        assert!(matches!(result, Err(AuthError::NoSessionState)));
    }

    #[tokio::test]
    async fn mismatched_state_clears_pending_and_never_calls_provider() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        h.auth.begin_login(&mut session).await.unwrap();

        let result = h
            .auth
            .complete_login(&mut session, callback("code", "forged"))
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert_eq!(session.record().pending(), None);
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replayed_callback_is_rejected() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();
        let pending = session.clone();

        h.auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap();

        let mut replay = pending;
        let result = h
            .auth
            .complete_login(&mut replay, callback("code", &state_of(&url)))
            .await;
        assert!(matches!(result, Err(AuthError::StateMissing)));
    }

    #[tokio::test]
    async fn empty_profile_does_not_authenticate() {
        let h = Harness::new(r#"{"data":[]}"#).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let result = h
            .auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await;
        assert!(matches!(result, Err(AuthError::ProfileEmpty)));
        assert!(!session.is_authenticated());
        assert_eq!(h.auth.users().get("42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn provider_error_is_denied() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let params = CallbackParams {
            state: Some(state_of(&url)),
            error: Some("access_denied".to_string()),
            error_description: Some("The user denied you access".to_string()),
            ..CallbackParams::default()
        };
        let result = h.auth.complete_login(&mut session, params).await;
        assert!(matches!(result, Err(AuthError::AuthorizationDenied { .. })));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn missing_code_fails_exchange() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let params = CallbackParams {
            state: Some(state_of(&url)),
            ..CallbackParams::default()
        };
        let result = h.auth.complete_login(&mut session, params).await;
        assert!(matches!(result, Err(AuthError::CodeExchangeFailed { .. })));
    }

    #[tokio::test]
    async fn logout_clears_user_and_is_idempotent() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();
        h.auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap();

        h.auth.logout(&mut session).unwrap();
        assert!(!session.is_authenticated());
        let once = session.record().clone();
        h.auth.logout(&mut session).unwrap();
        assert_eq!(session.record(), &once);
        assert_eq!(h.auth.current_user(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn current_user_reads_cache() {
        let h = Harness::new(PROFILE).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();
        h.auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap();

        let user = h.auth.current_user(&session).await.unwrap().unwrap();
        assert_eq!(user.login, "viewer");
        assert!(h.kv.get("user:42").await.is_ok());
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_authenticate() {
        let kv = Arc::new(FailingKv {
            fail_set: Some("user:"),
            ..FailingKv::default()
        });
        let h = Harness::with_kv(PROFILE, kv).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let err = h
            .auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CacheWriteFailed(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!session.is_authenticated());
        assert_eq!(session.record().pending(), None);
        assert_eq!(h.kv.get("user:42").await, Err(KvError::NotFound));
    }

    #[tokio::test]
    async fn state_write_failure_fails_login() {
        let kv = Arc::new(FailingKv {
            fail_set: Some("auth:"),
            ..FailingKv::default()
        });
        let h = Harness::with_kv(PROFILE, kv).await;
        let mut session = h.session();

        let err = h.auth.begin_login(&mut session).await.unwrap_err();
        assert!(matches!(err, AuthError::Kv(KvError::Backend(_))));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn backend_error_during_consume_is_internal_not_missing() {
        let kv = Arc::new(FailingKv {
            fail_get: Some("auth:"),
            ..FailingKv::default()
        });
        let h = Harness::with_kv(PROFILE, kv).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let err = h
            .auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Kv(KvError::Backend(_))));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(session.record().pending(), None);
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_during_consume_is_internal() {
        let kv = Arc::new(FailingKv {
            fail_delete: Some("auth:"),
            ..FailingKv::default()
        });
        let h = Harness::with_kv(PROFILE, kv).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();

        let err = h
            .auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Kv(KvError::Backend(_))));
        assert!(!session.is_authenticated());
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn default_take_consumes_state_once() {
        let h = Harness::with_kv(PROFILE, Arc::new(FailingKv::default())).await;
        let mut session = h.session();
        let url = h.auth.begin_login(&mut session).await.unwrap();
        let pending = session.clone();
        let id = session.record().pending().cloned().unwrap();

        h.auth
            .complete_login(&mut session, callback("code", &state_of(&url)))
            .await
            .unwrap();
        assert!(session.is_authenticated());
        assert_eq!(h.kv.get(&format!("auth:{id}")).await, Err(KvError::NotFound));

        let mut replay = pending;
        let result = h
            .auth
            .complete_login(&mut replay, callback("code", &state_of(&url)))
            .await;
        assert!(matches!(result, Err(AuthError::StateMissing)));
    }
}
