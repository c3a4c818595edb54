//! Stored OAuth tokens for calendar and wearable providers.
//!
//! The redirect flow that first obtains a token lives in the mobile shell.
//! This module only keeps the stored token fresh: an expired access token is
//! exchanged for a new one through the provider's token endpoint before any
//! API call, and the result is persisted. A failed refresh is never retried;
//! the user has to reconnect the provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::Provider;
use crate::clock::Clock;
use crate::error::{LifeHubError, Result};
use crate::integrations::http::check_status;
use crate::storage::TokenStore;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Expired once `now` is within `skew` of the provider-reported expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now.checked_add_signed(skew)
            .map_or(true, |deadline| deadline >= self.expires_at)
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Token endpoint response body (RFC 6749 section 5.1).
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Turn a grant into a stored token. Providers that do not rotate refresh
    /// tokens omit them, in which case the previous one stays valid.
    ///
    /// # Errors
    /// `Validation` when `expires_in` is negative or past the representable
    /// date range.
    pub fn into_token(
        self,
        now: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Result<OAuthToken> {
        let expires_at = Some(self.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                LifeHubError::Validation(format!(
                    "Token lifetime of {} seconds is out of range",
                    self.expires_in
                ))
            })?;

        Ok(OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at,
            scope: self.scope,
        })
    }
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Refresh-token grant against a provider's token endpoint.
pub struct HttpTokenRefresher {
    provider: Provider,
    client: reqwest::Client,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl HttpTokenRefresher {
    pub fn new(
        provider: Provider,
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            provider,
            client,
            token_url: token_url.into(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(LifeHubError::Config(format!(
                "{} OAuth client is not configured",
                self.provider
            )));
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];
        let response = self.client.post(&self.token_url).form(&form[..]).send().await?;
        let response = check_status(self.provider.as_str(), response).await?;
        Ok(response.json::<TokenGrant>().await?)
    }
}

/// Upper bound for the early-refresh margin.
const MAX_REFRESH_SKEW_SECS: i64 = 24 * 60 * 60;

/// Hands out valid access tokens for one provider.
pub struct TokenManager {
    provider: Provider,
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    skew: Duration,
}

impl TokenManager {
    pub fn new(
        provider: Provider,
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        skew_secs: i64,
    ) -> Self {
        Self {
            provider,
            store,
            refresher,
            clock,
            skew: Duration::seconds(skew_secs.clamp(0, MAX_REFRESH_SKEW_SECS)),
        }
    }

    /// A usable access token for `user_id`, refreshing it first if expired.
    ///
    /// # Errors
    /// `Unauthorized` when the provider was never connected, or when the
    /// stored token cannot be refreshed and the user has to reconnect.
    pub async fn access_token(&self, user_id: &str) -> Result<String> {
        let token = self
            .store
            .get_token(user_id, self.provider)
            .await?
            .ok_or_else(|| {
                LifeHubError::Unauthorized(format!("{} is not connected", self.provider))
            })?;

        let now = self.clock.now();
        if !token.is_expired_at(now, self.skew) {
            return Ok(token.access_token);
        }

        debug!("{} token expired at {}, refreshing", self.provider, token.expires_at);
        let Some(refresh_token) = token.refresh_token.clone() else {
            warn!("{} token expired and has no refresh token", self.provider);
            return Err(self.reconnect());
        };

        let grant = match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!("{} token refresh failed: {}", self.provider, e);
                return Err(self.reconnect());
            }
        };

        let refreshed = match grant.into_token(self.clock.now(), Some(refresh_token)) {
            Ok(token) => token,
            Err(e) => {
                warn!("{} returned an unusable token: {}", self.provider, e);
                return Err(self.reconnect());
            }
        };
        self.store
            .save_token(user_id, self.provider, &refreshed)
            .await?;
        info!(
            "Refreshed {} token, valid until {}",
            self.provider, refreshed.expires_at
        );
        Ok(refreshed.access_token)
    }

    /// Map a 401 on a token believed valid, meaning the grant was revoked,
    /// to the reconnect error. Other errors pass through.
    pub fn rejected(&self, err: LifeHubError) -> LifeHubError {
        match err {
            LifeHubError::Upstream { status: 401, .. } => {
                warn!("{} rejected the access token", self.provider);
                self.reconnect()
            }
            other => other,
        }
    }

    fn reconnect(&self) -> LifeHubError {
        LifeHubError::Unauthorized(format!(
            "{} session expired, please reconnect",
            self.provider
        ))
    }
}
