//! Twitch OAuth 2.0 authorization-code login for axum applications.
//!
//! Each login binds a random correlation id to a signed session cookie and
//! stores a single-use CSRF secret for it in a key/value backend. The callback
//! consumes that secret, exchanges the code, fetches the Helix user profile,
//! caches it and marks the session authenticated.

mod client;
mod config;
mod error;
mod flow;
mod identity;
mod kv;
mod provider;
mod server;
mod session;
mod state_store;
mod token;
mod types;
mod user_cache;

pub use client::{OAuthClient, ProviderConfig};
pub use config::{AppConfig, AuthSettings, cookie_key_from_secret};
pub use error::AuthError;
pub use flow::Authenticator;
pub use identity::IdentityClient;
pub use kv::{KvError, KvStore, MemoryKv};
pub use provider::TwitchProvider;
pub use server::{CALLBACK_PATH, LOGIN_PATH, LOGOUT_PATH, router};
pub use session::{CookiePolicy, Session, SessionManager, SessionRecord};
pub use state_store::StateStore;
pub use token::{CorrelationId, StateSecret};
pub use types::{AccessToken, CallbackParams, TokenResponse, TokenScope, UserProfile, UsersResponse};
pub use user_cache::UserCache;

pub use axum_extra::extract::cookie::{Key as CookieKey, SameSite};
