use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::SourceError;
use crate::config::{PlatformConfig, PlatformHttpConfig};
use crate::models::Platform;

/// Holds one platform's OAuth credentials and renews them.
///
/// When the platform rejects the access token, callers ask for a refresh. At
/// most `max_attempts` refresh-token grants are tried with exponential
/// backoff and jitter; if all fail, the credentials are dropped and every
/// later call reports [`SourceError::ReauthenticationRequired`] until the
/// service is given new tokens.
pub struct TokenSession {
    platform: Platform,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    http: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
    credentials: RwLock<Credentials>,
    // Serialises refreshes so concurrent 401s trigger one grant
    refresh_lock: Mutex<()>,
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
}

impl TokenSession {
    pub fn new(
        platform: Platform,
        config: &PlatformConfig,
        http_config: &PlatformHttpConfig,
        http: reqwest::Client,
    ) -> Self {
        Self {
            platform,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            http,
            max_attempts: http_config.max_refresh_attempts,
            backoff: http_config.refresh_backoff,
            credentials: RwLock::new(Credentials {
                access_token: config.access_token.clone(),
                refresh_token: config.refresh_token.clone(),
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The current access token, obtaining one first if none is held.
    pub async fn access_token(&self) -> Result<String, SourceError> {
        let current = self.credentials.read().await.access_token.clone();
        match current {
            Some(token) => Ok(token),
            None => self.refresh(None).await,
        }
    }

    /// Replace a rejected token. If another task already swapped `stale` for
    /// a fresh token, that token is returned without another grant.
    pub async fn refresh(&self, stale: Option<&str>) -> Result<String, SourceError> {
        let _guard = self.refresh_lock.lock().await;

        let creds = self.credentials.read().await.clone();
        if let Some(current) = creds.access_token {
            if Some(current.as_str()) != stale {
                return Ok(current);
            }
        }

        let Some(refresh_token) = creds.refresh_token else {
            self.invalidate().await;
            return Err(self.reauthenticate());
        };

        for attempt in 1..=self.max_attempts {
            match self.request_grant(&refresh_token).await {
                Ok(grant) => {
                    tracing::info!(platform = %self.platform, attempt, "access token refreshed");
                    let mut creds = self.credentials.write().await;
                    creds.access_token = Some(grant.access_token.clone());
                    if grant.refresh_token.is_some() {
                        creds.refresh_token = grant.refresh_token;
                    }
                    return Ok(grant.access_token);
                }
                Err(err) => {
                    tracing::warn!(
                        platform = %self.platform,
                        attempt,
                        max_attempts = self.max_attempts,
                        "token refresh failed: {err}"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            platform = %self.platform,
            "token refresh attempts exhausted; re-authentication required"
        );
        self.invalidate().await;
        Err(self.reauthenticate())
    }

    /// Forget both tokens.
    pub async fn invalidate(&self) {
        let mut creds = self.credentials.write().await;
        creds.access_token = None;
        creds.refresh_token = None;
    }

    pub fn reauthenticate(&self) -> SourceError {
        SourceError::ReauthenticationRequired {
            platform: self.platform,
        }
    }

    /// Exponential backoff from `backoff`, plus up to 50% random jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self
            .backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(10));
        let max_jitter = (base.as_millis() / 2) as u64;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }

    async fn request_grant(&self, refresh_token: &str) -> Result<TokenGrant, SourceError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(id) = &self.client_id {
            form.push(("client_id", id.as_str()));
        }
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                platform: self.platform,
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                platform: self.platform,
                status: resp.status().as_u16(),
            });
        }

        resp.json().await.map_err(|e| SourceError::Decode {
            platform: self.platform,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(access: Option<&str>, refresh: Option<&str>, attempts: u32) -> TokenSession {
        let config = PlatformConfig {
            // Nothing listens on port 1
            token_url: "http://127.0.0.1:1/oauth/token".into(),
            access_token: access.map(str::to_owned),
            refresh_token: refresh.map(str::to_owned),
            ..PlatformConfig::default()
        };
        let http_config = PlatformHttpConfig {
            timeout: Duration::from_secs(2),
            max_refresh_attempts: attempts,
            refresh_backoff: Duration::from_millis(1),
        };
        TokenSession::new(Platform::LinkedIn, &config, &http_config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn held_token_is_returned_without_refresh() {
        let s = session(Some("abc"), None, 3);
        assert_eq!(s.access_token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn refresh_reuses_a_token_already_replaced() {
        let s = session(Some("fresh"), Some("r"), 3);
        assert_eq!(s.refresh(Some("stale")).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn missing_refresh_token_requires_reauthentication() {
        let s = session(Some("abc"), None, 3);
        let err = s.refresh(Some("abc")).await.unwrap_err();
        assert!(matches!(err, SourceError::ReauthenticationRequired { .. }));
    }

    #[tokio::test]
    async fn exhausted_refreshes_clear_credentials() {
        let s = session(Some("abc"), Some("r"), 2);
        let err = s.refresh(Some("abc")).await.unwrap_err();
        assert!(matches!(err, SourceError::ReauthenticationRequired { .. }));

        // Nothing left to refresh with: fails fast from now on
        let err = s.access_token().await.unwrap_err();
        assert!(matches!(err, SourceError::ReauthenticationRequired { .. }));
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let mut s = session(None, None, 3);
        s.backoff = Duration::from_millis(100);
        let first = s.retry_delay(1);
        let third = s.retry_delay(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));
    }
}
