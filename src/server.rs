use std::sync::Arc;

use axum::Router;
use axum::extract::{FromRef, RawQuery, State};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::Key;

use crate::{Authenticator, CallbackParams, KvStore};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const CALLBACK_PATH: &str = "/api/auth/callback";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

struct AppState<K> {
    auth: Arc<Authenticator<K>>,
}

// Manual Clone: derive would require `K: Clone`.
impl<K> Clone for AppState<K> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
        }
    }
}

impl<K: KvStore> FromRef<AppState<K>> for Key {
    fn from_ref(state: &AppState<K>) -> Self {
        state.auth.settings().cookie_key.clone()
    }
}

/// Routes for the login handshake plus the `/me` profile lookup.
pub fn router<K: KvStore>(auth: Authenticator<K>) -> Router {
    let state = AppState {
        auth: Arc::new(auth),
    };

    Router::new()
        .route(LOGIN_PATH, get(login::<K>))
        .route(CALLBACK_PATH, get(callback::<K>))
        .route(LOGOUT_PATH, get(logout::<K>))
        .route("/me", get(me::<K>))
        .route("/login", get(|| async { Redirect::to(LOGIN_PATH) }))
        .route("/logout", get(|| async { Redirect::to(LOGOUT_PATH) }))
        .with_state(state)
}

async fn login<K: KvStore>(State(state): State<AppState<K>>, jar: SignedCookieJar) -> Response {
    let mut session = state.auth.sessions().get(jar);
    match state.auth.begin_login(&mut session).await {
        Ok(url) => (session.into_jar(), Redirect::temporary(url.as_str())).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn callback<K: KvStore>(
    State(state): State<AppState<K>>,
    jar: SignedCookieJar,
    RawQuery(query): RawQuery,
) -> Response {
    // Repeated or malformed parameters still reach the state check.
    let params = CallbackParams::from_query(query.as_deref().unwrap_or_default());
    let mut session = state.auth.sessions().get(jar);
    let result = state.auth.complete_login(&mut session, params).await;

    // The jar is returned on failure too: it carries the cleared pending state.
    match result {
        Ok(_) => (
            session.into_jar(),
            Redirect::to(&state.auth.settings().home_path),
        )
            .into_response(),
        Err(err) => (session.into_jar(), err).into_response(),
    }
}

async fn logout<K: KvStore>(State(state): State<AppState<K>>, jar: SignedCookieJar) -> Response {
    let mut session = state.auth.sessions().get(jar);
    match state.auth.logout(&mut session) {
        Ok(()) => (
            session.into_jar(),
            Redirect::to(&state.auth.settings().home_path),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn me<K: KvStore>(State(state): State<AppState<K>>, jar: SignedCookieJar) -> Response {
    let session = state.auth.sessions().get(jar);
    let home = &state.auth.settings().home_path;
    match state.auth.current_user(&session).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => Redirect::to(home).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to load cached user");
            Redirect::to(home).into_response()
        }
    }
}
