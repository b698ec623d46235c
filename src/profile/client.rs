use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{LoginInfo, NewUser, ProfileApi, ProfileError, ProfileUpdate, User};

/// Talks to the profile endpoints exposed under `base_url` (e.g.
/// `http://127.0.0.1:3146/api`).
#[derive(Debug, Clone)]
pub struct HttpProfileClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: Option<String>,
    days_remaining: Option<i64>,
}

impl HttpProfileClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let user_agent = format!("yoostream/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build profile API HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn user_url(&self, uid: &str, suffix: &str) -> String {
        format!(
            "{}/users/{}{}",
            self.base_url,
            urlencoding::encode(uid),
            suffix
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        uid: &str,
        request: RequestBuilder,
    ) -> Result<T, ProfileError> {
        let res = request
            .send()
            .await
            .map_err(|e| ProfileError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| ProfileError::Transport(e.to_string()))?;
        debug!(uid, status = status.as_u16(), "Profile API response");

        if status.is_success() {
            return serde_json::from_slice(&bytes)
                .map_err(|e| ProfileError::Invalid(format!("unexpected response body: {e}")));
        }

        let body: Option<ErrorBody> = serde_json::from_slice(&bytes).ok();
        let (message, days_remaining) = match body {
            Some(b) => (b.message, b.days_remaining),
            None => (None, None),
        };
        Err(match (status, days_remaining) {
            (StatusCode::NOT_FOUND, _) => ProfileError::NotFound(uid.to_string()),
            (StatusCode::CONFLICT, Some(days_remaining)) => {
                ProfileError::Cooldown { days_remaining }
            }
            _ => ProfileError::Server {
                status: status.as_u16(),
                message: message
                    .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()),
            },
        })
    }
}

#[async_trait]
impl ProfileApi for HttpProfileClient {
    async fn create_user(&self, user: NewUser) -> Result<User, ProfileError> {
        let url = format!("{}/users", self.base_url);
        let uid = user.uid.clone();
        self.send(&uid, self.client.post(url).json(&user)).await
    }

    async fn get_user(&self, uid: &str) -> Result<User, ProfileError> {
        self.send(uid, self.client.get(self.user_url(uid, ""))).await
    }

    async fn update_user(&self, uid: &str, update: ProfileUpdate) -> Result<User, ProfileError> {
        self.send(uid, self.client.put(self.user_url(uid, "")).json(&update))
            .await
    }

    async fn update_login_info(&self, uid: &str, login: LoginInfo) -> Result<User, ProfileError> {
        let url = self.user_url(uid, "/login-info");
        self.send(uid, self.client.put(url).json(&login)).await
    }

    async fn change_display_name(
        &self,
        uid: &str,
        display_name: &str,
    ) -> Result<User, ProfileError> {
        let url = self.user_url(uid, "/display-name");
        let body = json!({ "displayName": display_name });
        self.send(uid, self.client.put(url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_urls_escape_the_uid() {
        let client = HttpProfileClient::new("http://localhost:3146/api/").expect("client");
        assert_eq!(
            client.user_url("a b/c", "/login-info"),
            "http://localhost:3146/api/users/a%20b%2Fc/login-info"
        );
    }
}
