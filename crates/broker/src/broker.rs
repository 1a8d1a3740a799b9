//! The Credential Broker (§4.A): mints App JWTs and installation tokens,
//! caches the latter with single-flight refresh, and hands out
//! installation-scoped REST clients.

use std::fs;

use prhub_core::config::PlatformConfig;
use prhub_core::{HubError, HubResult};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::{cache_expiry, CachedToken, TokenCache};
use crate::client::InstallationClient;
use crate::jwt::mint_app_jwt;

const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct CreateTokenResponse {
    token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct CredentialBroker {
    http: reqwest::Client,
    app_id: String,
    private_key_pem: Vec<u8>,
    cache: TokenCache,
}

impl CredentialBroker {
    /// Loads the App private key from `PLATFORM_PRIVATE_KEY` (inline PEM) or
    /// `PLATFORM_PRIVATE_KEY_PATH` (file). A missing key is fatal at startup
    /// per §4.A's failure modes.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ConfigMissing`] if neither source is configured
    /// or the file can't be read.
    pub fn from_config(config: &PlatformConfig) -> HubResult<Self> {
        let private_key_pem = if let Some(inline) = &config.private_key {
            inline.clone().into_bytes()
        } else if let Some(path) = &config.private_key_path {
            fs::read(path).map_err(|e| HubError::ConfigMissing {
                var: format!("PLATFORM_PRIVATE_KEY_PATH (failed to read {path}: {e})"),
            })?
        } else {
            return Err(HubError::ConfigMissing {
                var: "PLATFORM_PRIVATE_KEY_PATH or PLATFORM_PRIVATE_KEY".to_string(),
            });
        };

        if config.app_id.is_empty() {
            return Err(HubError::ConfigMissing {
                var: "PLATFORM_APP_ID".to_string(),
            });
        }

        Ok(Self {
            http: reqwest::Client::new(),
            app_id: config.app_id.clone(),
            private_key_pem,
            cache: TokenCache::new(),
        })
    }

    /// Mints a fresh App JWT; never cached beyond the single outbound call
    /// that uses it.
    pub fn app_jwt(&self) -> HubResult<String> {
        mint_app_jwt(&self.app_id, &self.private_key_pem)
    }

    /// Returns a cached installation token if still fresh, otherwise mints a
    /// new one. Concurrent callers for the same `installation_id` coalesce
    /// onto the same refresh via the per-installation lock in
    /// [`TokenCache`].
    pub async fn installation_token(&self, installation_id: i64) -> HubResult<String> {
        let slot = self.cache.slot(installation_id).await;
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }

        debug!(installation_id, "refreshing installation token");
        let jwt = self.app_jwt()?;
        let url = format!("{GITHUB_API_URL}/app/installations/{installation_id}/access_tokens");

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {jwt}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "prhub/1.0")
            .send()
            .await
            .map_err(|e| HubError::UpstreamTransient {
                reason: format!("token mint request failed: {e}"),
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(HubError::CredentialDenied {
                reason: format!("token mint rejected with {status}"),
            });
        }
        if !status.is_success() {
            return Err(HubError::UpstreamTransient {
                reason: format!("token mint returned {status}"),
            });
        }

        let parsed: CreateTokenResponse = response.json().await.map_err(|e| HubError::Internal {
            reason: format!("failed to parse token mint response: {e}"),
        })?;

        let cached = CachedToken {
            token: parsed.token.clone(),
            expires_at: cache_expiry(parsed.expires_at),
        };
        info!(installation_id, expires_at = %cached.expires_at, "minted installation token");
        *guard = Some(cached);

        Ok(parsed.token)
    }

    /// Hands out a REST client scoped to `installation_id`, refreshing the
    /// cached token if needed first.
    pub async fn installation_client(&self, installation_id: i64) -> HubResult<InstallationClient> {
        let token = self.installation_token(installation_id).await?;
        Ok(InstallationClient::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PlatformConfig {
        PlatformConfig {
            app_id: "123".to_string(),
            private_key_path: None,
            private_key: Some("not a real key".to_string()),
            webhook_secret: None,
            oauth_client_id: None,
            oauth_client_secret: None,
        }
    }

    #[test]
    fn missing_key_is_config_missing() {
        let mut config = test_config();
        config.private_key = None;
        let result = CredentialBroker::from_config(&config);
        assert!(matches!(result, Err(HubError::ConfigMissing { .. })));
    }

    #[test]
    fn missing_app_id_is_config_missing() {
        let mut config = test_config();
        config.app_id = String::new();
        let result = CredentialBroker::from_config(&config);
        assert!(matches!(result, Err(HubError::ConfigMissing { .. })));
    }

    #[test]
    fn valid_config_constructs_broker() {
        let config = test_config();
        assert!(CredentialBroker::from_config(&config).is_ok());
    }
}
