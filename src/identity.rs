use reqwest::Client;

use crate::{AccessToken, AuthError, UserProfile, UsersResponse};

/// Fetches the signed-in user's record from the Helix users endpoint.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    users_url: String,
    client_id: String,
    http: Client,
}

impl IdentityClient {
    pub fn new(users_url: impl Into<String>, client_id: impl Into<String>, http: Client) -> Self {
        Self {
            users_url: users_url.into(),
            client_id: client_id.into(),
            http,
        }
    }

    pub async fn fetch_profile(&self, token: &AccessToken) -> Result<UserProfile, AuthError> {
        let response = self
            .http
            .get(&self.users_url)
            .bearer_auth(token.secret())
            .header("Client-Id", &self.client_id)
            .send()
            .await
            .map_err(|err| AuthError::ProfileFetchFailed {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::ProfileFetchFailed {
                message: format!("http status {}", status.as_u16()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::ProfileFetchFailed {
                message: err.to_string(),
            })?;

        let users: UsersResponse =
            serde_json::from_slice(&body).map_err(|err| AuthError::ProfileDecodeFailed {
                message: err.to_string(),
            })?;

        users.data.into_iter().next().ok_or(AuthError::ProfileEmpty)
    }
}
