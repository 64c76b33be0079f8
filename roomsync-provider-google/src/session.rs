//! OAuth access token for the calls that need one (channels), refreshed from
//! a long-lived refresh token and kept in memory until it expires.

use chrono::{DateTime, Duration, Utc};
use roomsync_core::{RoomSyncError, RoomSyncResult};
use serde::Deserialize;
use tokio::sync::RwLock;

/// Tokens are refreshed this long before Google would reject them.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug)]
pub struct Session {
    token_url: String,
    credentials: OAuthCredentials,
    cached: RwLock<Option<AccessToken>>,
}

impl Session {
    pub fn new(token_url: impl Into<String>, credentials: OAuthCredentials) -> Self {
        Session {
            token_url: token_url.into(),
            credentials,
            cached: RwLock::new(None),
        }
    }

    /// A valid access token, refreshing it first when expired.
    pub async fn access_token(&self, http: &reqwest::Client) -> RoomSyncResult<String> {
        if let Some(token) = self.cached.read().await.as_ref()
            && !token.is_expired()
        {
            return Ok(token.value.clone());
        }

        let mut cached = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref()
            && !token.is_expired()
        {
            return Ok(token.value.clone());
        }

        let token = self.refresh(http).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Forget the cached token after Google refused it.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    async fn refresh(&self, http: &reqwest::Client) -> RoomSyncResult<AccessToken> {
        tracing::debug!(token_url = %self.token_url, "refreshing Google access token");

        let response = http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| RoomSyncError::ProviderTransient(format!("token refresh: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Google token refresh failed");
            return Err(if status.is_server_error() {
                RoomSyncError::ProviderTransient(format!("token refresh returned {status}"))
            } else {
                RoomSyncError::ProviderRejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RoomSyncError::Serialization(format!("token response: {e}")))?;

        Ok(AccessToken {
            value: refreshed.access_token,
            expires_at: Utc::now() + Duration::seconds(refreshed.expires_in),
        })
    }
}
