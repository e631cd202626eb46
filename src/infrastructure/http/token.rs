use super::wire::{TokenRequest, TokenResponse};
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Client-credentials bearer token, fetched on demand and reused until expiry.
///
/// The whole check-then-refresh runs under one lock, so callers arriving
/// during a refresh wait for it and then reuse its token.
pub(crate) struct TokenCache {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(
        client: reqwest::Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
            timeout,
            cached: Mutex::new(None),
        }
    }

    pub async fn bearer(&self) -> GatewayResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.is_valid(Utc::now())
        {
            debug!("using cached access token");
            return Ok(token.token.clone());
        }

        debug!("requesting new access token");
        let fresh = tokio::time::timeout(self.timeout, self.fetch())
            .await
            .map_err(|_| GatewayError::AuthTimeout(self.timeout))??;

        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Forgets the cached token, e.g. after the gateway rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch(&self) -> GatewayResult<CachedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                grant_type: "client_credentials",
            })
            .send()
            .await
            .map_err(|e| GatewayError::Auth {
                message: format!("token request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth {
                message: format!("token endpoint returned HTTP {}: {}", status.as_u16(), body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| GatewayError::Auth {
            message: format!("failed to parse token response: {e}"),
        })?;

        if token.access_token.is_empty() {
            return Err(GatewayError::Auth {
                message: "token response carried an empty access token".to_string(),
            });
        }

        info!(expires_in = token.expires_in, "obtained gateway access token");

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(token.expires_in.max(0)),
        })
    }
}
